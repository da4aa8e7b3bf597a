//! HTTP middleware and request extractors
//!
//! Contains:
//! - Shared application state
//! - Session cookie resolution
//! - The profile-completion gate
//! - The login-required extractor
//! - JSON error responses for the AJAX endpoints

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::{
    AccountService, CategoryService, ListingService, LoginRateLimiter, SuggestionService, UserService,
};
use crate::theme::ThemeEngine;

pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub account_service: Arc<AccountService>,
    pub category_service: Arc<CategoryService>,
    pub listing_service: Arc<ListingService>,
    pub suggestion_service: Arc<SuggestionService>,
    pub theme: Arc<ThemeEngine>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

/// The logged-in user, resolved once per request by [`session_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{}: {}", self.error.code, self.error.message);
        }

        (status, Json(self)).into_response()
    }
}

/// Read a cookie value from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(token: &str, days: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        days * 24 * 60 * 60
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Resolve the session cookie into a [`CurrentUser`] extension.
///
/// Requests without a valid session pass through anonymously.
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = cookie_value(request.headers(), SESSION_COOKIE).filter(|t| !t.is_empty()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(CurrentUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Path prefixes reachable with an incomplete profile
const PROFILE_GATE_EXEMPT: &[&str] = &[
    "/complete-profile",
    "/listings",
    "/listing/",
    "/logout",
    "/static",
    "/media",
    "/api/",
    "/search-suggestions",
    "/verify-email",
    "/password-reset",
];

pub fn profile_gate_applies(path: &str) -> bool {
    !PROFILE_GATE_EXEMPT.iter().any(|prefix| path.starts_with(prefix))
}

/// Send logged-in users without contact details to `/complete-profile/`.
pub async fn profile_gate(request: Request, next: Next) -> Response {
    let incomplete = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|u| !u.0.profile_complete());

    if incomplete && profile_gate_applies(request.uri().path()) {
        return Redirect::to("/complete-profile/").into_response();
    }
    next.run(request).await
}

/// Logged-in user; anonymous requests are redirected to the login page.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentUser>() {
            Some(user) => Ok(AuthenticatedUser(user.0.clone())),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                let location = format!("/login/?next={}", urlencoding::encode(next));
                Err(Redirect::to(&location).into_response())
            }
        }
    }
}

/// Only accept a same-site path as a post-login redirect target
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.starts_with("/\\") => n,
        _ => "/",
    }
}

/// The AJAX endpoints insist on `X-Requested-With: XMLHttpRequest`.
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc-123; flash=x"));
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("abc-123"));
        assert_eq!(cookie_value(&headers, "flash").as_deref(), Some("x"));
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn test_profile_gate_exemptions() {
        for path in ["/complete-profile/", "/listings/", "/listing/4/", "/logout/", "/static/css/site.css", "/api/subcategories/"] {
            assert!(!profile_gate_applies(path), "{} should be exempt", path);
        }
        for path in ["/", "/create-listing/", "/my-listings/", "/account/settings/"] {
            assert!(profile_gate_applies(path), "{} should be gated", path);
        }
    }

    #[test]
    fn test_safe_next_rejects_offsite_targets() {
        assert_eq!(safe_next(Some("/my-listings/")), "/my-listings/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", 7);
        assert!(cookie.starts_with("session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("Max-Age=604800"));
    }
}
