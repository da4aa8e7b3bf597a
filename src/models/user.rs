//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered marketplace user. The email is the login identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Display handle (unique)
    pub username: String,
    /// Email address (unique, used to log in)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub telegram_username: String,
    pub phone: String,
    pub location: String,
    pub email_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A profile is complete once both contact fields are filled in.
    pub fn profile_complete(&self) -> bool {
        !self.telegram_username.trim().is_empty() && !self.phone.trim().is_empty()
    }
}

/// Row values for inserting a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub telegram_username: String,
    pub phone: String,
    pub location: String,
}

/// Editable contact details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub telegram_username: String,
    pub phone: String,
    pub location: String,
}
