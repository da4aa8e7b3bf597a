//! Home and informational pages

use axum::{extract::State, response::Response};
use tera::Context as TeraContext;

use crate::api::middleware::AppState;
use crate::api::responses::{render_page, PageChrome, PageError};

/// GET /
pub async fn home(State(state): State<AppState>, chrome: PageChrome) -> Result<Response, PageError> {
    let listings = state.listing_service.home().await?;

    let mut context = TeraContext::new();
    context.insert("recent_listings", &listings.recent);
    context.insert("featured", &listings.featured);
    context.insert("categories", &state.category_service.list().await?);
    Ok(render_page(&state, chrome, "home.html", context))
}

/// GET /privacy-policy/
pub async fn privacy_policy(State(state): State<AppState>, chrome: PageChrome) -> Response {
    render_page(&state, chrome, "privacy_policy.html", TeraContext::new())
}

/// GET /terms-of-service/
pub async fn terms_of_service(State(state): State<AppState>, chrome: PageChrome) -> Response {
    render_page(&state, chrome, "terms_of_service.html", TeraContext::new())
}

/// Router fallback
pub async fn not_found() -> PageError {
    PageError::NotFound
}
