//! HTTP layer: page handlers, JSON endpoints and routing
//!
//! Page handlers render Tera templates and answer failures with
//! [`responses::PageError`]; the JSON endpoints answer with
//! [`middleware::ApiError`].

pub mod account;
pub mod ajax;
pub mod auth;
pub mod listings;
pub mod middleware;
pub mod pages;
pub mod responses;
pub mod static_files;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::config::Config;

pub use middleware::{ApiError, AppState};

/// Image parts accepted in one listing form
const MAX_UPLOADS_PER_FORM: u64 = 10;

/// Largest accepted request body: a full listing form plus its images
fn body_limit(config: &Config) -> usize {
    let images = config.images.max_file_size.saturating_mul(MAX_UPLOADS_PER_FORM);
    usize::try_from(images.saturating_add(1024 * 1024)).unwrap_or(usize::MAX)
}

fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/privacy-policy/", get(pages::privacy_policy))
        .route("/terms-of-service/", get(pages::terms_of_service))
        .route("/listings/", get(listings::list_listings))
        .route("/listing/{id}/", get(listings::listing_detail))
        .route(
            "/create-listing/",
            get(listings::create_listing_page).post(listings::create_listing),
        )
        .route(
            "/listing/{id}/edit/",
            get(listings::edit_listing_page).post(listings::edit_listing),
        )
        .route("/my-listings/", get(listings::my_listings))
        .route("/listing/{id}/status/{status}/", post(listings::set_listing_status))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup/", get(auth::signup_page).post(auth::signup))
        .route("/login/", get(auth::login_page).post(auth::login))
        .route("/logout/", post(auth::logout))
        .route(
            "/complete-profile/",
            get(auth::complete_profile_page).post(auth::complete_profile),
        )
        .route("/verify-email/{uidb64}/{token}/", get(account::verify_email))
        .route("/resend-verification/", post(account::resend_verification))
        .route(
            "/password-reset/",
            get(account::password_reset_page).post(account::password_reset),
        )
        .route(
            "/password-reset-confirm/{uidb64}/{token}/",
            get(account::password_reset_confirm_page).post(account::password_reset_confirm),
        )
        .route(
            "/account/settings/",
            get(account::settings_page).post(account::update_settings),
        )
        .route("/account/delete/", get(account::delete_account_page))
        .route("/account/delete/confirm/", post(account::delete_account))
}

fn ajax_routes() -> Router<AppState> {
    Router::new()
        .route("/api/subcategories/", get(ajax::subcategories))
        .route("/api/filter-listings/", get(ajax::filter_listings))
        .route("/search-suggestions/", get(ajax::search_suggestions))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .merge(page_routes())
        .merge(auth_routes())
        .merge(ajax_routes())
        .merge(static_files::asset_router(&config.images.upload_dir))
        .fallback(pages::not_found)
        // Innermost first: the gate and error pages both read the user the
        // session layer resolved
        .layer(axum_middleware::from_fn(middleware::profile_gate))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            responses::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit(config)))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
