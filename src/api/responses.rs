//! HTML page responses
//!
//! Page handlers return [`PageError`] on failure. It carries only a status
//! and message; [`render_error_pages`] turns it into the themed error page
//! because plain `IntoResponse` has no access to the template engine.
//!
//! One-shot "flash" messages survive a redirect in a cookie holding
//! url-encoded JSON, and are cleared by the next rendered page.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::middleware::{cookie_value, AppState, CurrentUser};
use crate::models::User;
use crate::services::{AccountServiceError, CategoryServiceError, ListingServiceError, UserServiceError};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Success, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: FlashLevel::Error, message: message.into() }
    }
}

pub fn flash_cookie(messages: &[FlashMessage]) -> String {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", FLASH_COOKIE, urlencoding::encode(&json))
}

fn clear_flash_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", FLASH_COOKIE)
}

pub fn decode_flash(raw: &str) -> Vec<FlashMessage> {
    urlencoding::decode(raw)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

/// 303 redirect
pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// 303 redirect carrying flash messages, plus any extra cookies
pub fn redirect_with(to: &str, messages: &[FlashMessage], extra_cookies: &[String]) -> Response {
    let mut cookies: Vec<(header::HeaderName, String)> = extra_cookies
        .iter()
        .map(|c| (header::SET_COOKIE, c.clone()))
        .collect();
    if !messages.is_empty() {
        cookies.push((header::SET_COOKIE, flash_cookie(messages)));
    }
    (AppendHeaders(cookies), Redirect::to(to)).into_response()
}

/// Per-request page chrome: the user and pending flash messages
#[derive(Debug, Clone, Default)]
pub struct PageChrome {
    pub user: Option<User>,
    pub messages: Vec<FlashMessage>,
}

impl<S: Send + Sync> FromRequestParts<S> for PageChrome {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PageChrome {
            user: parts.extensions.get::<CurrentUser>().map(|u| u.0.clone()),
            messages: cookie_value(&parts.headers, FLASH_COOKIE)
                .map(|raw| decode_flash(&raw))
                .unwrap_or_default(),
        })
    }
}

/// Render a page template with the common context.
pub fn render_page(state: &AppState, chrome: PageChrome, template: &str, context: TeraContext) -> Response {
    render_page_with_status(state, chrome, template, context, StatusCode::OK)
}

pub fn render_page_with_status(
    state: &AppState,
    chrome: PageChrome,
    template: &str,
    mut context: TeraContext,
    status: StatusCode,
) -> Response {
    context.insert("current_user", &chrome.user);
    context.insert("messages", &chrome.messages);
    if !context.contains_key("form_errors") {
        context.insert("form_errors", &serde_json::json!({}));
    }

    let html = state.theme.render_with_fallback(template, &context);
    let mut response = (status, Html(html)).into_response();
    if !chrome.messages.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&clear_flash_cookie()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Failure of an HTML page handler
#[derive(Debug)]
pub enum PageError {
    NotFound,
    BadRequest(String),
    Internal(anyhow::Error),
}

/// Marker left on error responses for [`render_error_pages`]
#[derive(Debug, Clone)]
struct ErrorPage {
    message: String,
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PageError::NotFound => (StatusCode::NOT_FOUND, "The page you requested could not be found.".to_string()),
            PageError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            PageError::Internal(e) => {
                tracing::error!("Page handler failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong on our end.".to_string())
            }
        };
        let mut response = (status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Internal(e)
    }
}

impl From<ListingServiceError> for PageError {
    fn from(e: ListingServiceError) -> Self {
        match e {
            ListingServiceError::NotFound(_) => PageError::NotFound,
            other => PageError::Internal(other.into()),
        }
    }
}

impl From<CategoryServiceError> for PageError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => PageError::NotFound,
            other => PageError::Internal(other.into()),
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        PageError::Internal(e.into())
    }
}

impl From<AccountServiceError> for PageError {
    fn from(e: AccountServiceError) -> Self {
        PageError::Internal(e.into())
    }
}

/// Replace bare [`PageError`] responses with the themed error page.
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = request.extensions().get::<CurrentUser>().map(|u| u.0.clone());
    let response = next.run(request).await;

    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };
    let status = response.status();
    let mut context = TeraContext::new();
    context.insert("status", &status.as_u16());
    context.insert("message", &page.message);
    let chrome = PageChrome { user, messages: Vec::new() };
    render_page_with_status(&state, chrome, "error.html", context, status)
}
