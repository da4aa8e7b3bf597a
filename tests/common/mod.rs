//! Shared fixtures for the HTTP tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

use bazaar::{
    api::{build_router, AppState},
    app::build_state,
    config::Config,
    db::{create_test_pool, migrations::run_migrations},
    services::{Mailer, OutgoingEmail, TAXONOMY},
};

pub const PASSWORD: &str = "market-stall-42";

/// Keeps every outgoing message for inspection
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().await.push(email);
        Ok(())
    }
}

impl RecordingMailer {
    pub async fn subjects(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.subject.clone()).collect()
    }

    /// First absolute link in the last message with this subject, as a path
    pub async fn link_path(&self, subject: &str) -> Option<String> {
        let sent = self.sent.lock().await;
        let html = &sent.iter().rev().find(|m| m.subject == subject)?.html;
        let start = html.find("href=\"")? + "href=\"".len();
        let end = html[start..].find('"')? + start;
        let url = &html[start..end];
        url.find("://")
            .and_then(|scheme| url[scheme + 3..].find('/').map(|p| url[scheme + 3 + p..].to_string()))
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let media = TempDir::new().unwrap();
        let mut config = Config::default();
        config.images.upload_dir = media.path().to_path_buf();
        config.server.base_url = "http://bazaar.test".to_string();

        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let state = build_state(&config, pool, mailer.clone()).unwrap();
        state.category_service.seed(TAXONOMY).await.unwrap();

        let app = build_router(state.clone(), &config);
        let server = TestServer::builder().save_cookies().build(app).unwrap();

        Self {
            server,
            state,
            mailer,
            _media: media,
        }
    }

    /// Sign up (and stay logged in) with a complete profile
    pub async fn signup(&self, username: &str) {
        let response = self
            .server
            .post("/signup/")
            .form(&[
                ("username", username.to_string()),
                ("email", format!("{}@example.com", username)),
                ("password1", PASSWORD.to_string()),
                ("password2", PASSWORD.to_string()),
                ("telegram_username", format!("@{}", username)),
                ("phone", "+251911000000".to_string()),
                ("location", "Addis Ababa".to_string()),
            ])
            .await;
        assert_eq!(response.status_code(), 303, "signup failed: {}", response.text());
    }

    pub async fn logout(&self) {
        self.server.post("/logout/").await;
    }

    /// First category and its first subcategory
    pub async fn taxonomy_ids(&self) -> (i64, i64) {
        let categories = self.state.category_service.list().await.unwrap();
        let category = &categories[0];
        let subcategories = self.state.category_service.subcategories(category.id).await.unwrap();
        (category.id, subcategories[0].id)
    }
}

pub fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
