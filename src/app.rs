//! Application wiring shared by the server binary and the integration tests

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::AppState;
use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxListingImageRepository, SqlxListingRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    image_store_from_config, AccountService, CategoryService, EmailService, ListingService, LoginRateLimiter,
    Mailer, SuggestionService, TokenGenerator, UserService,
};
use crate::theme::ThemeEngine;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Build every service over an already migrated pool.
pub fn build_state(config: &Config, pool: DynDatabasePool, mailer: Arc<dyn Mailer>) -> Result<AppState> {
    let cache = create_cache(&config.cache);
    let theme = Arc::new(
        ThemeEngine::new(config.theme.path.as_deref()).context("Failed to initialize templates")?,
    );
    let store = image_store_from_config(&config.images)?;

    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let category_repo = SqlxCategoryRepository::boxed(pool.clone());
    let listing_repo = SqlxListingRepository::boxed(pool.clone());
    let image_repo = SqlxListingImageRepository::boxed(pool);

    let rate_limiter = Arc::new(LoginRateLimiter::from_config(&config.security));
    let tokens = Arc::new(TokenGenerator::new(
        &signing_secret(&config.server.secret_key),
        config.security.token_ttl_seconds,
    ));
    let emails = Arc::new(EmailService::new(
        mailer,
        theme.clone(),
        tokens.clone(),
        config.server.base_url(),
    ));

    let user_service = Arc::new(
        UserService::new(user_repo.clone(), session_repo.clone(), rate_limiter.clone())
            .with_session_expiration(config.server.session_days),
    );
    let account_service = Arc::new(AccountService::new(
        user_repo.clone(),
        session_repo,
        tokens,
        emails,
    ));
    let category_service = Arc::new(CategoryService::new(category_repo.clone(), cache));
    let listing_service = Arc::new(ListingService::new(
        listing_repo.clone(),
        image_repo,
        user_repo,
        category_service.clone(),
        store,
        config.images.clone(),
    ));
    let suggestion_service = Arc::new(SuggestionService::new(category_repo, listing_repo));

    Ok(AppState {
        user_service,
        account_service,
        category_service,
        listing_service,
        suggestion_service,
        theme,
        rate_limiter,
    })
}

/// The configured secret, or a random per-process one when unset.
///
/// With a random secret, links in emails stop working after a restart.
fn signing_secret(configured: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    tracing::warn!("server.secret_key is empty, using a random secret for this run");
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Periodic housekeeping: forget stale login failures and drop expired sessions.
pub fn spawn_background_tasks(state: &AppState) {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    let users = state.user_service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match users.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Removed {} expired sessions", removed),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    });
}

/// `RUST_LOG`, defaulting to info for this crate and debug for request traces.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config path from `BAZAAR_CONFIG`, else `config.yml`
pub fn config_path() -> std::path::PathBuf {
    std::env::var("BAZAAR_CONFIG")
        .map(Into::into)
        .unwrap_or_else(|_| "config.yml".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_secret_prefers_configured_value() {
        assert_eq!(signing_secret("market-secret"), "market-secret");
        let generated = signing_secret("");
        assert_eq!(generated.len(), 64);
        assert_ne!(generated, signing_secret(""));
    }
}
