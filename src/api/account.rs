//! Account pages
//!
//! - GET      /verify-email/{uidb64}/{token}/
//! - POST     /resend-verification/
//! - GET/POST /password-reset/
//! - GET/POST /password-reset-confirm/{uidb64}/{token}/
//! - GET/POST /account/settings/
//! - GET      /account/delete/
//! - POST     /account/delete/confirm/

use axum::{
    extract::{Path, State},
    response::Response,
    Form,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::middleware::{clear_session_cookie, AppState, AuthenticatedUser};
use crate::api::responses::{redirect_with, render_page, FlashMessage, PageChrome, PageError};
use crate::models::{FormErrors, ProfileUpdate};
use crate::services::{AccountServiceError, UserServiceError};

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPasswordForm {
    #[serde(default)]
    pub new_password1: String,
    #[serde(default)]
    pub new_password2: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    #[serde(default)]
    pub password: String,
}

/// GET /verify-email/{uidb64}/{token}/
pub async fn verify_email(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
) -> Result<Response, PageError> {
    let message = match state.account_service.verify_email(&uidb64, &token).await {
        Ok(_) => FlashMessage::success("Your email has been verified. Thank you!"),
        Err(AccountServiceError::InvalidLink) => {
            FlashMessage::error("The verification link is invalid or has expired.")
        }
        Err(e) => return Err(e.into()),
    };
    Ok(redirect_with("/", &[message], &[]))
}

/// POST /resend-verification/
pub async fn resend_verification(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let message = match state.account_service.resend_verification(&user).await {
        Ok(()) => FlashMessage::success("A new verification email has been sent."),
        Err(AccountServiceError::AlreadyVerified) => FlashMessage::info("Your email is already verified."),
        Err(AccountServiceError::EmailDelivery(e)) => {
            tracing::warn!(user_id = user.id, "Verification email failed: {}", e);
            FlashMessage::error("We couldn't send the verification email. Please try again later.")
        }
        Err(e) => return Err(e.into()),
    };
    Ok(redirect_with("/account/settings/", &[message], &[]))
}

/// GET /password-reset/
pub async fn password_reset_page(State(state): State<AppState>, chrome: PageChrome) -> Response {
    let mut context = TeraContext::new();
    context.insert("sent", &false);
    render_page(&state, chrome, "password_reset.html", context)
}

/// POST /password-reset/
///
/// Renders the same confirmation whether or not the address is registered.
pub async fn password_reset(
    State(state): State<AppState>,
    chrome: PageChrome,
    Form(form): Form<ResetRequestForm>,
) -> Result<Response, PageError> {
    state.account_service.request_password_reset(&form.email).await?;
    let mut context = TeraContext::new();
    context.insert("sent", &true);
    Ok(render_page(&state, chrome, "password_reset.html", context))
}

fn reset_confirm_context(valid_link: bool, errors: &FormErrors) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("valid_link", &valid_link);
    context.insert("form_errors", errors);
    context
}

/// GET /password-reset-confirm/{uidb64}/{token}/
pub async fn password_reset_confirm_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    Path((uidb64, token)): Path<(String, String)>,
) -> Result<Response, PageError> {
    let valid_link = match state.account_service.check_reset_link(&uidb64, &token).await {
        Ok(_) => true,
        Err(AccountServiceError::InvalidLink) => false,
        Err(e) => return Err(e.into()),
    };
    let context = reset_confirm_context(valid_link, &FormErrors::new());
    Ok(render_page(&state, chrome, "password_reset_confirm.html", context))
}

/// POST /password-reset-confirm/{uidb64}/{token}/
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    chrome: PageChrome,
    Path((uidb64, token)): Path<(String, String)>,
    Form(form): Form<NewPasswordForm>,
) -> Result<Response, PageError> {
    let result = state
        .account_service
        .confirm_password_reset(&uidb64, &token, &form.new_password1, &form.new_password2)
        .await;
    let context = match result {
        Ok(_) => {
            return Ok(redirect_with(
                "/login/",
                &[FlashMessage::success("Your password has been reset. You can now log in.")],
                &[clear_session_cookie()],
            ));
        }
        Err(AccountServiceError::InvalidLink) => reset_confirm_context(false, &FormErrors::new()),
        Err(AccountServiceError::Validation(errors)) => reset_confirm_context(true, &errors),
        Err(e) => return Err(e.into()),
    };
    Ok(render_page(&state, chrome, "password_reset_confirm.html", context))
}

fn settings_context(profile: &ProfileUpdate, errors: &FormErrors) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", profile);
    context.insert("form_errors", errors);
    context
}

/// GET /account/settings/
pub async fn settings_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Response {
    let profile = ProfileUpdate {
        telegram_username: user.telegram_username,
        phone: user.phone,
        location: user.location,
    };
    render_page(&state, chrome, "account_settings.html", settings_context(&profile, &FormErrors::new()))
}

/// POST /account/settings/
pub async fn update_settings(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(profile): Form<ProfileUpdate>,
) -> Result<Response, PageError> {
    match state.user_service.update_profile(user.id, &profile).await {
        Ok(_) => Ok(redirect_with(
            "/account/settings/",
            &[FlashMessage::success("Your profile has been updated.")],
            &[],
        )),
        Err(UserServiceError::Validation(errors)) => Ok(render_page(
            &state,
            chrome,
            "account_settings.html",
            settings_context(&profile, &errors),
        )),
        Err(e) => Err(e.into()),
    }
}

/// GET /account/delete/
pub async fn delete_account_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Response {
    render_page(&state, chrome, "account_delete.html", TeraContext::new())
}

/// POST /account/delete/confirm/
pub async fn delete_account(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<DeleteAccountForm>,
) -> Result<Response, PageError> {
    match state.account_service.delete_account(&user, &form.password).await {
        Ok(()) => Ok(redirect_with(
            "/",
            &[FlashMessage::info("Your account has been deleted.")],
            &[clear_session_cookie()],
        )),
        Err(AccountServiceError::IncorrectPassword) => {
            let mut errors = FormErrors::new();
            errors.add("password", AccountServiceError::IncorrectPassword.to_string());
            let mut context = TeraContext::new();
            context.insert("form_errors", &errors);
            Ok(render_page(&state, chrome, "account_delete.html", context))
        }
        Err(e) => Err(e.into()),
    }
}
