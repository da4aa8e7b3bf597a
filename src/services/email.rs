//! Transactional email
//!
//! [`EmailService`] renders one template per event and hands the message to
//! a [`Mailer`]. Without an SMTP host the [`LogMailer`] only logs what would
//! have been sent.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::config::EmailConfig;
use crate::models::User;
use crate::services::tokens::{encode_uid, TokenGenerator, TokenPurpose};
use crate::theme::ThemeEngine;

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, host: &str) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Development mailer that writes messages to the log
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (not sent, no SMTP host):\n{}", email.html);
        Ok(())
    }
}

/// SMTP when a host is configured, otherwise the log mailer.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref().map(str::trim) {
        Some(host) if !host.is_empty() => Ok(Arc::new(SmtpMailer::new(config, host)?)),
        _ => {
            tracing::warn!("No SMTP host configured, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    theme: Arc<ThemeEngine>,
    tokens: Arc<TokenGenerator>,
    base_url: String,
}

impl EmailService {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        theme: Arc<ThemeEngine>,
        tokens: Arc<TokenGenerator>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            theme,
            tokens,
            base_url: base_url.into(),
        }
    }

    pub async fn send_welcome(&self, user: &User) -> Result<()> {
        self.deliver(user, "Welcome to Bazaar!", "emails/welcome.html", None)
            .await
    }

    pub async fn send_verification(&self, user: &User) -> Result<()> {
        let link = self.token_link("verify-email", TokenPurpose::VerifyEmail, user);
        self.deliver(user, "Verify Your Email Address", "emails/verify_email.html", Some(("verification_link", link)))
            .await
    }

    pub async fn send_password_reset(&self, user: &User) -> Result<()> {
        let link = self.token_link("password-reset-confirm", TokenPurpose::PasswordReset, user);
        self.deliver(user, "Password Reset Request", "emails/password_reset.html", Some(("reset_link", link)))
            .await
    }

    pub async fn send_account_deleted(&self, user: &User) -> Result<()> {
        self.deliver(user, "Account Deletion Confirmation", "emails/account_deleted.html", None)
            .await
    }

    /// Absolute `/<route>/<uidb64>/<token>/` link
    fn token_link(&self, route: &str, purpose: TokenPurpose, user: &User) -> String {
        format!(
            "{}/{}/{}/{}/",
            self.base_url.trim_end_matches('/'),
            route,
            encode_uid(user.id),
            self.tokens.make_token(purpose, user)
        )
    }

    async fn deliver(
        &self,
        user: &User,
        subject: &str,
        template: &str,
        link: Option<(&str, String)>,
    ) -> Result<()> {
        let mut context = TeraContext::new();
        context.insert("user", &json!({ "username": user.username, "email": user.email }));
        context.insert("site_url", &self.base_url);
        if let Some((name, url)) = link {
            context.insert(name, &url);
        }
        let html = self.theme.render(template, &context)?;

        self.mailer
            .send(OutgoingEmail {
                to: user.email.clone(),
                subject: subject.to_string(),
                html,
            })
            .await
    }
}

#[cfg(test)]
pub mod testing {
    //! Mailers for tests

    use super::*;
    use tokio::sync::Mutex;

    /// Records every message instead of sending it
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> Result<()> {
            self.sent.lock().await.push(email);
            Ok(())
        }
    }

    /// Fails every delivery
    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: OutgoingEmail) -> Result<()> {
            Err(anyhow!("SMTP server unavailable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingMailer, RecordingMailer};
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 7,
            username: "yonas".to_string(),
            email: "yonas@example.com".to_string(),
            password_hash: "hash".to_string(),
            telegram_username: String::new(),
            phone: String::new(),
            location: String::new(),
            email_verified: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(mailer: Arc<dyn Mailer>) -> EmailService {
        EmailService::new(
            mailer,
            Arc::new(ThemeEngine::embedded().unwrap()),
            Arc::new(TokenGenerator::new("secret", 3600)),
            "https://bazaar.test/",
        )
    }

    #[tokio::test]
    async fn test_verification_email_carries_working_link() {
        let mailer = Arc::new(RecordingMailer::default());
        let tokens = TokenGenerator::new("secret", 3600);
        service(mailer.clone()).send_verification(&user()).await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "yonas@example.com");
        assert_eq!(sent[0].subject, "Verify Your Email Address");

        let prefix = format!("https://bazaar.test/verify-email/{}/", encode_uid(7));
        let start = sent[0].html.find(&prefix).expect("link present");
        let rest = &sent[0].html[start + prefix.len()..];
        let token = &rest[..rest.find('/').unwrap()];
        assert!(tokens.check_token(TokenPurpose::VerifyEmail, &user(), token));
    }

    #[tokio::test]
    async fn test_each_event_uses_its_template() {
        let mailer = Arc::new(RecordingMailer::default());
        let emails = service(mailer.clone());
        let account = user();
        emails.send_welcome(&account).await.unwrap();
        emails.send_password_reset(&account).await.unwrap();
        emails.send_account_deleted(&account).await.unwrap();

        let sent = mailer.sent.lock().await;
        let subjects: Vec<&str> = sent.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(
            subjects,
            vec!["Welcome to Bazaar!", "Password Reset Request", "Account Deletion Confirmation"]
        );
        assert!(sent[1].html.contains("/password-reset-confirm/"));
        assert!(sent.iter().all(|m| m.html.contains("yonas")));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_returned() {
        let result = service(Arc::new(FailingMailer)).send_welcome(&user()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_mailer_from_config_without_host_logs() {
        assert!(mailer_from_config(&EmailConfig::default()).is_ok());
    }
}
