//! Authentication pages
//!
//! - GET/POST /signup/            - register, log in, send welcome + verification
//! - GET/POST /login/             - email/password login (rate limited)
//! - POST     /logout/            - end the session
//! - GET/POST /complete-profile/  - fill in the contact details

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Form,
};
use serde::Deserialize;
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::middleware::{
    clear_session_cookie, cookie_value, safe_next, session_cookie, AppState, AuthenticatedUser, SESSION_COOKIE,
};
use crate::api::responses::{
    redirect, redirect_with, render_page, render_page_with_status, FlashMessage, PageChrome, PageError,
};
use crate::models::{FormErrors, ProfileUpdate};
use crate::services::user::{LoginInput, SignupInput};
use crate::services::UserServiceError;

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

fn signup_context(input: &SignupInput, errors: &FormErrors) -> TeraContext {
    let mut context = TeraContext::new();
    // Passwords are never echoed back
    context.insert(
        "form",
        &json!({
            "username": input.username,
            "email": input.email,
            "telegram_username": input.telegram_username,
            "phone": input.phone,
            "location": input.location,
        }),
    );
    context.insert("form_errors", errors);
    context
}

/// GET /signup/
pub async fn signup_page(State(state): State<AppState>, chrome: PageChrome) -> Response {
    if chrome.user.is_some() {
        return redirect("/");
    }
    let context = signup_context(&SignupInput::default(), &FormErrors::new());
    render_page(&state, chrome, "signup.html", context)
}

/// POST /signup/
pub async fn signup(
    State(state): State<AppState>,
    chrome: PageChrome,
    Form(input): Form<SignupInput>,
) -> Result<Response, PageError> {
    let user = match state.user_service.register(&input).await {
        Ok(user) => user,
        Err(UserServiceError::Validation(errors)) => {
            let context = signup_context(&input, &errors);
            return Ok(render_page(&state, chrome, "signup.html", context));
        }
        Err(e) => return Err(e.into()),
    };

    let session = state.user_service.start_session(&user).await?;
    // Tokens are bound to last_login, which the new session just set
    let user = state.user_service.get_by_id(user.id).await?.unwrap_or(user);
    let mut messages = vec![FlashMessage::success("Account created successfully!")];
    if let Err(e) = state.account_service.send_signup_emails(&user).await {
        tracing::warn!(user_id = user.id, "Signup email failed: {}", e);
        messages.push(FlashMessage::warning(
            "We couldn't send your verification email. You can request a new one from your account settings.",
        ));
    } else {
        messages.push(FlashMessage::info("Please check your inbox to verify your email address."));
    }

    let cookie = session_cookie(&session.id, state.user_service.session_expiration_days());
    Ok(redirect_with("/", &messages, &[cookie]))
}

fn login_context(email: &str, next: Option<&str>, errors: &FormErrors) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("email", email);
    context.insert("next", &next.unwrap_or_default());
    context.insert("form_errors", errors);
    context
}

/// GET /login/
pub async fn login_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    Query(query): Query<NextQuery>,
) -> Response {
    if chrome.user.is_some() {
        return redirect(safe_next(query.next.as_deref()));
    }
    let context = login_context("", query.next.as_deref(), &FormErrors::new());
    render_page(&state, chrome, "login.html", context)
}

/// POST /login/
pub async fn login(
    State(state): State<AppState>,
    chrome: PageChrome,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let input = LoginInput {
        email: form.email.clone(),
        password: form.password,
    };
    let status = match state.user_service.login(&input).await {
        Ok((user, session)) => {
            tracing::info!(user_id = user.id, "User logged in");
            let cookie = session_cookie(&session.id, state.user_service.session_expiration_days());
            return Ok(redirect_with(safe_next(form.next.as_deref()), &[], &[cookie]));
        }
        Err(UserServiceError::InvalidCredentials) => StatusCode::OK,
        Err(UserServiceError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        Err(e) => return Err(e.into()),
    };

    let mut errors = FormErrors::new();
    errors.add_general(if status == StatusCode::OK {
        UserServiceError::InvalidCredentials.to_string()
    } else {
        UserServiceError::RateLimited.to_string()
    });
    let context = login_context(&form.email, form.next.as_deref(), &errors);
    Ok(render_page_with_status(&state, chrome, "login.html", context, status))
}

/// POST /logout/
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, PageError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE).filter(|t| !t.is_empty()) {
        state.user_service.logout(&token).await?;
    }
    Ok(redirect_with(
        "/",
        &[FlashMessage::info("You have been logged out.")],
        &[clear_session_cookie()],
    ))
}

fn profile_context(profile: &ProfileUpdate, errors: &FormErrors) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", profile);
    context.insert("form_errors", errors);
    context
}

/// GET /complete-profile/
pub async fn complete_profile_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Response {
    let profile = ProfileUpdate {
        telegram_username: user.telegram_username,
        phone: user.phone,
        location: user.location,
    };
    render_page(&state, chrome, "complete_profile.html", profile_context(&profile, &FormErrors::new()))
}

/// POST /complete-profile/
pub async fn complete_profile(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(profile): Form<ProfileUpdate>,
) -> Result<Response, PageError> {
    match state.user_service.update_profile(user.id, &profile).await {
        Ok(_) => Ok(redirect_with(
            "/",
            &[FlashMessage::success("Profile completed successfully!")],
            &[],
        )),
        Err(UserServiceError::Validation(errors)) => Ok(render_page(
            &state,
            chrome,
            "complete_profile.html",
            profile_context(&profile, &errors),
        )),
        Err(e) => Err(e.into()),
    }
}
