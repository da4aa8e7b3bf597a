//! User service
//!
//! Registration, email/password login with throttling, cookie sessions and
//! profile edits.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{max_length, required, FormErrors, NewUser, ProfileUpdate, Session, User};
use crate::services::password::{hash_password, validate_password_strength, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Invalid input: {0}")]
    Validation(FormErrors),

    #[error("Please enter a correct email and password.")]
    InvalidCredentials,

    #[error("Too many failed login attempts. Please try again later.")]
    RateLimited,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Submitted sign-up form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
    #[serde(default)]
    pub telegram_username: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Lowercase and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the contact fields; `require_contacts` makes telegram and phone mandatory.
pub fn validate_profile(profile: &ProfileUpdate, require_contacts: bool) -> (ProfileUpdate, FormErrors) {
    let mut errors = FormErrors::new();
    let telegram = if require_contacts {
        required(&mut errors, "telegram_username", &profile.telegram_username)
    } else {
        profile.telegram_username.trim()
    };
    let phone = if require_contacts {
        required(&mut errors, "phone", &profile.phone)
    } else {
        profile.phone.trim()
    };
    let location = profile.location.trim();
    max_length(&mut errors, "telegram_username", telegram, 100);
    max_length(&mut errors, "phone", phone, 20);
    max_length(&mut errors, "location", location, 200);

    let cleaned = ProfileUpdate {
        telegram_username: telegram.to_string(),
        phone: phone.to_string(),
        location: location.to_string(),
    };
    (cleaned, errors)
}

/// Password pair check shared by sign-up and reset.
pub fn validate_new_password(
    errors: &mut FormErrors,
    password1: &str,
    password2: &str,
    attributes: &[&str],
) {
    if password1.is_empty() {
        errors.add("password1", "This field is required.");
    }
    if password2.is_empty() {
        errors.add("password2", "This field is required.");
    }
    if password1.is_empty() || password2.is_empty() {
        return;
    }
    if password1 != password2 {
        errors.add("password2", "The two password fields didn't match.");
        return;
    }
    for problem in validate_password_strength(password2, attributes) {
        errors.add("password2", problem);
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    rate_limiter: Arc<LoginRateLimiter>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        rate_limiter: Arc<LoginRateLimiter>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            rate_limiter,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Validate the sign-up form and create the account.
    ///
    /// The email is stored lowercased; usernames are unique ignoring case.
    pub async fn register(&self, input: &SignupInput) -> Result<User, UserServiceError> {
        let mut errors = FormErrors::new();

        let username = required(&mut errors, "username", &input.username);
        if !username.is_empty() {
            max_length(&mut errors, "username", username, 150);
            if !USERNAME_RE.is_match(username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            } else if self
                .user_repo
                .get_by_username(username)
                .await
                .context("Failed to check username")?
                .is_some()
            {
                errors.add("username", "A user with that username already exists.");
            }
        }

        let email = normalize_email(required(&mut errors, "email", &input.email));
        if !email.is_empty() {
            max_length(&mut errors, "email", &email, 254);
            if !EMAIL_RE.is_match(&email) {
                errors.add("email", "Enter a valid email address.");
            } else if self
                .user_repo
                .get_by_email(&email)
                .await
                .context("Failed to check email")?
                .is_some()
            {
                errors.add("email", "A user with that email already exists.");
            }
        }

        validate_new_password(&mut errors, &input.password1, &input.password2, &[username, &email]);

        let (profile, profile_errors) = validate_profile(
            &ProfileUpdate {
                telegram_username: input.telegram_username.clone(),
                phone: input.phone.clone(),
                location: input.location.clone(),
            },
            false,
        );
        for field in ["telegram_username", "phone", "location"] {
            for message in profile_errors.get(field) {
                errors.add(field, message.clone());
            }
        }

        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        let password_hash = hash_password(&input.password1).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&NewUser {
                username: username.to_string(),
                email,
                password_hash,
                telegram_username: profile.telegram_username,
                phone: profile.phone,
                location: profile.location,
            })
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = user.id, "Registered user {}", user.username);
        Ok(user)
    }

    /// Check credentials and open a session.
    pub async fn login(&self, input: &LoginInput) -> Result<(User, Session), UserServiceError> {
        let email = normalize_email(&input.email);
        if self.rate_limiter.is_limited(&email).await {
            tracing::warn!("Login throttled for {}", email);
            return Err(UserServiceError::RateLimited);
        }

        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?;

        let Some(user) = user else {
            self.rate_limiter.record_failure(&email).await;
            return Err(UserServiceError::InvalidCredentials);
        };
        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            self.rate_limiter.record_failure(&email).await;
            return Err(UserServiceError::InvalidCredentials);
        }

        self.rate_limiter.clear(&email).await;
        let session = self.start_session(&user).await?;
        let user = self.get_by_id(user.id).await?.unwrap_or(user);
        Ok((user, session))
    }

    /// Open a session without a password check (right after sign-up)
    pub async fn start_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        self.user_repo
            .touch_last_login(user.id, now)
            .await
            .context("Failed to record login time")?;

        let session = Session::issue(user.id, now, self.session_expiration_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a live session; expired sessions are removed.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Save contact details; telegram and phone are always required here.
    pub async fn update_profile(&self, user_id: i64, profile: &ProfileUpdate) -> Result<User, UserServiceError> {
        let (cleaned, errors) = validate_profile(profile, true);
        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }
        self.user_repo
            .update_profile(user_id, &cleaned)
            .await
            .context("Failed to update profile")?;
        self.get_by_id(user_id)
            .await?
            .ok_or_else(|| UserServiceError::InternalError(anyhow::anyhow!("User {} vanished", user_id)))
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }
}
