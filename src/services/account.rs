//! Account service
//!
//! The token-backed flows: email verification, password reset and account
//! deletion. Links carry `<uidb64>/<token>` produced by [`TokenGenerator`].

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{FormErrors, User};
use crate::services::email::EmailService;
use crate::services::password::{hash_password, verify_password};
use crate::services::tokens::{decode_uid, TokenGenerator, TokenPurpose};
use crate::services::user::{normalize_email, validate_new_password};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    #[error("The link is invalid or has expired.")]
    InvalidLink,

    #[error("Your email is already verified.")]
    AlreadyVerified,

    #[error("Incorrect password.")]
    IncorrectPassword,

    #[error("Invalid input: {0}")]
    Validation(FormErrors),

    #[error("Failed to send email: {0}")]
    EmailDelivery(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AccountService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    tokens: Arc<TokenGenerator>,
    emails: Arc<EmailService>,
}

impl AccountService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        tokens: Arc<TokenGenerator>,
        emails: Arc<EmailService>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            tokens,
            emails,
        }
    }

    /// Welcome and verification emails after sign-up. Stops at the first failure.
    pub async fn send_signup_emails(&self, user: &User) -> Result<(), AccountServiceError> {
        self.emails
            .send_welcome(user)
            .await
            .map_err(AccountServiceError::EmailDelivery)?;
        self.emails
            .send_verification(user)
            .await
            .map_err(AccountServiceError::EmailDelivery)?;
        Ok(())
    }

    pub async fn resend_verification(&self, user: &User) -> Result<(), AccountServiceError> {
        if user.email_verified {
            return Err(AccountServiceError::AlreadyVerified);
        }
        self.emails
            .send_verification(user)
            .await
            .map_err(AccountServiceError::EmailDelivery)
    }

    /// Consume a verification link and mark the email verified.
    pub async fn verify_email(&self, uidb64: &str, token: &str) -> Result<User, AccountServiceError> {
        let mut user = self.user_from_link(TokenPurpose::VerifyEmail, uidb64, token).await?;
        self.user_repo
            .set_email_verified(user.id, true)
            .await
            .context("Failed to mark email verified")?;
        user.email_verified = true;
        tracing::info!(user_id = user.id, "Email verified");
        Ok(user)
    }

    /// Send a reset link if the address belongs to an account.
    ///
    /// Unknown addresses and delivery failures look exactly like success to
    /// the caller; failures are only logged.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountServiceError> {
        let email = normalize_email(email);
        let Some(user) = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };
        if let Err(e) = self.emails.send_password_reset(&user).await {
            tracing::warn!(user_id = user.id, "Failed to send password reset email: {}", e);
        }
        Ok(())
    }

    /// Validate a reset link without consuming it (for the GET form).
    pub async fn check_reset_link(&self, uidb64: &str, token: &str) -> Result<User, AccountServiceError> {
        self.user_from_link(TokenPurpose::PasswordReset, uidb64, token).await
    }

    /// Set a new password through a reset link and end every session.
    pub async fn confirm_password_reset(
        &self,
        uidb64: &str,
        token: &str,
        password1: &str,
        password2: &str,
    ) -> Result<User, AccountServiceError> {
        let user = self.check_reset_link(uidb64, token).await?;

        let mut errors = FormErrors::new();
        validate_new_password(&mut errors, password1, password2, &[&user.username, &user.email]);
        if !errors.is_empty() {
            return Err(AccountServiceError::Validation(errors));
        }

        let password_hash = hash_password(password1).context("Failed to hash password")?;
        self.user_repo
            .set_password(user.id, &password_hash)
            .await
            .context("Failed to set password")?;
        let ended = self
            .session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to delete sessions")?;
        tracing::info!(user_id = user.id, sessions = ended, "Password reset");

        Ok(User { password_hash, ..user })
    }

    /// Delete the account after re-checking the password.
    ///
    /// The notice email is best effort; a delivery failure never blocks the
    /// deletion.
    pub async fn delete_account(&self, user: &User, password: &str) -> Result<(), AccountServiceError> {
        let valid = verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !valid {
            return Err(AccountServiceError::IncorrectPassword);
        }

        if let Err(e) = self.emails.send_account_deleted(user).await {
            tracing::warn!(user_id = user.id, "Failed to send account deletion email: {}", e);
        }

        let deleted = self
            .user_repo
            .delete_account(user.id)
            .await
            .context("Failed to delete account")?;
        if !deleted {
            return Err(AccountServiceError::InternalError(anyhow::anyhow!(
                "User {} was already gone",
                user.id
            )));
        }
        tracing::info!(user_id = user.id, "Deleted account {}", user.username);
        Ok(())
    }

    async fn user_from_link(
        &self,
        purpose: TokenPurpose,
        uidb64: &str,
        token: &str,
    ) -> Result<User, AccountServiceError> {
        let id = decode_uid(uidb64).ok_or(AccountServiceError::InvalidLink)?;
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(AccountServiceError::InvalidLink)?;
        if !self.tokens.check_token(purpose, &user, token) {
            return Err(AccountServiceError::InvalidLink);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::DynDatabasePool;
    use crate::models::Session;
    use crate::services::email::testing::{FailingMailer, RecordingMailer};
    use crate::services::email::Mailer;
    use crate::services::tokens::encode_uid;
    use crate::theme::ThemeEngine;
    use chrono::{Duration, Utc};

    struct Fixture {
        pool: DynDatabasePool,
        service: AccountService,
        tokens: Arc<TokenGenerator>,
        mailer: Arc<RecordingMailer>,
    }

    async fn fixture_with(mailer: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Fixture {
        let pool = setup_pool().await;
        let tokens = Arc::new(TokenGenerator::new("account-secret", 3600));
        let emails = Arc::new(EmailService::new(
            mailer,
            Arc::new(ThemeEngine::embedded().unwrap()),
            tokens.clone(),
            "http://localhost:8000",
        ));
        let service = AccountService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            tokens.clone(),
            emails,
        );
        Fixture {
            pool,
            service,
            tokens,
            mailer: recorder,
        }
    }

    async fn fixture() -> Fixture {
        let recorder = Arc::new(RecordingMailer::default());
        fixture_with(recorder.clone(), recorder).await
    }

    async fn load(pool: &DynDatabasePool, id: i64) -> User {
        SqlxUserRepository::new(pool.clone()).get_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_verify_email_is_single_use() {
        let fx = fixture().await;
        let user = load(&fx.pool, insert_user(&fx.pool, "selam").await).await;
        let token = fx.tokens.make_token(TokenPurpose::VerifyEmail, &user);
        let uid = encode_uid(user.id);

        let verified = fx.service.verify_email(&uid, &token).await.unwrap();
        assert!(verified.email_verified);
        assert!(load(&fx.pool, user.id).await.email_verified);

        assert!(matches!(
            fx.service.verify_email(&uid, &token).await,
            Err(AccountServiceError::InvalidLink)
        ));
    }

    #[tokio::test]
    async fn test_tampered_links_are_rejected() {
        let fx = fixture().await;
        let user = load(&fx.pool, insert_user(&fx.pool, "tsion").await).await;
        let token = fx.tokens.make_token(TokenPurpose::VerifyEmail, &user);

        for (uid, token) in [
            ("not-base64!".to_string(), token.clone()),
            (encode_uid(user.id + 100), token.clone()),
            (encode_uid(user.id), format!("{}0", token)),
            (encode_uid(user.id), fx.tokens.make_token(TokenPurpose::PasswordReset, &user)),
        ] {
            assert!(matches!(
                fx.service.verify_email(&uid, &token).await,
                Err(AccountServiceError::InvalidLink)
            ));
        }
        assert!(!load(&fx.pool, user.id).await.email_verified);
    }

    #[tokio::test]
    async fn test_password_reset_changes_password_and_ends_sessions() {
        let fx = fixture().await;
        let user = load(&fx.pool, insert_user(&fx.pool, "bereket").await).await;
        let sessions = SqlxSessionRepository::new(fx.pool.clone());
        let now = Utc::now();
        sessions
            .create(&Session {
                id: "live-session".to_string(),
                user_id: user.id,
                expires_at: now + Duration::days(1),
                created_at: now,
            })
            .await
            .unwrap();

        fx.service.request_password_reset("  BEREKET@example.com").await.unwrap();
        assert_eq!(fx.mailer.sent.lock().await.len(), 1);

        let token = fx.tokens.make_token(TokenPurpose::PasswordReset, &user);
        let uid = encode_uid(user.id);

        let Err(AccountServiceError::Validation(errors)) = fx
            .service
            .confirm_password_reset(&uid, &token, "short", "short")
            .await
        else {
            panic!("expected validation errors");
        };
        assert!(errors.has("password2"));

        fx.service
            .confirm_password_reset(&uid, &token, "amber-lantern-42", "amber-lantern-42")
            .await
            .unwrap();
        let stored = load(&fx.pool, user.id).await;
        assert!(verify_password("amber-lantern-42", &stored.password_hash).unwrap());
        assert!(sessions.get_by_id("live-session").await.unwrap().is_none());

        assert!(matches!(
            fx.service.check_reset_link(&uid, &token).await,
            Err(AccountServiceError::InvalidLink)
        ));
    }

    #[tokio::test]
    async fn test_reset_request_for_unknown_email_sends_nothing() {
        let fx = fixture().await;
        fx.service.request_password_reset("nobody@example.com").await.unwrap();
        assert!(fx.mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_resend_verification_for_verified_user() {
        let fx = fixture().await;
        let mut user = load(&fx.pool, insert_user(&fx.pool, "liya").await).await;
        fx.service.resend_verification(&user).await.unwrap();
        assert_eq!(fx.mailer.sent.lock().await.len(), 1);

        user.email_verified = true;
        assert!(matches!(
            fx.service.resend_verification(&user).await,
            Err(AccountServiceError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn test_delete_account_checks_password_and_survives_mail_failure() {
        let recorder = Arc::new(RecordingMailer::default());
        let fx = fixture_with(Arc::new(FailingMailer), recorder).await;
        let user = load(&fx.pool, insert_user(&fx.pool, "meron").await).await;
        let hashed = User {
            password_hash: hash_password("correct-horse-77").unwrap(),
            ..user
        };
        SqlxUserRepository::new(fx.pool.clone())
            .set_password(hashed.id, &hashed.password_hash)
            .await
            .unwrap();

        assert!(matches!(
            fx.service.delete_account(&hashed, "wrong").await,
            Err(AccountServiceError::IncorrectPassword)
        ));
        fx.service.delete_account(&hashed, "correct-horse-77").await.unwrap();
        assert!(SqlxUserRepository::new(fx.pool.clone())
            .get_by_id(hashed.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_signup_email_failure_is_reported() {
        let recorder = Arc::new(RecordingMailer::default());
        let fx = fixture_with(Arc::new(FailingMailer), recorder).await;
        let user = load(&fx.pool, insert_user(&fx.pool, "abel").await).await;
        assert!(matches!(
            fx.service.send_signup_emails(&user).await,
            Err(AccountServiceError::EmailDelivery(_))
        ));
    }
}
