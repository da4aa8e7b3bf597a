//! Signed single-use account tokens
//!
//! A token is `<unix seconds, base36>-<hex HMAC-SHA256>`. The MAC covers the
//! user fields that the consuming action changes, so a token stops
//! verifying once it has been used.

use chrono::{DateTime, Utc};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    PasswordReset,
}

impl TokenPurpose {
    fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify-email",
            TokenPurpose::PasswordReset => "password-reset",
        }
    }
}

pub struct TokenGenerator {
    secret: Vec<u8>,
    ttl_seconds: i64,
}

impl TokenGenerator {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_seconds,
        }
    }

    pub fn make_token(&self, purpose: TokenPurpose, user: &User) -> String {
        self.make_token_at(purpose, user, Utc::now())
    }

    fn make_token_at(&self, purpose: TokenPurpose, user: &User, at: DateTime<Utc>) -> String {
        let timestamp = at.timestamp();
        let digest = self.mac(purpose, user, timestamp).finalize().into_bytes();
        format!("{}-{}", to_base36(timestamp as u64), HEXLOWER.encode(&digest))
    }

    /// True when the token was issued for this purpose and user state and
    /// has not outlived the TTL.
    pub fn check_token(&self, purpose: TokenPurpose, user: &User, token: &str) -> bool {
        self.check_token_at(purpose, user, token, Utc::now())
    }

    fn check_token_at(&self, purpose: TokenPurpose, user: &User, token: &str, now: DateTime<Utc>) -> bool {
        let Some((ts_part, mac_part)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_part) else {
            return false;
        };
        let Ok(expected) = HEXLOWER.decode(mac_part.as_bytes()) else {
            return false;
        };
        let Ok(timestamp) = i64::try_from(timestamp) else {
            return false;
        };
        let age = now.timestamp() - timestamp;
        if age < 0 || age > self.ttl_seconds {
            return false;
        }
        self.mac(purpose, user, timestamp).verify_slice(&expected).is_ok()
    }

    fn mac(&self, purpose: TokenPurpose, user: &User, timestamp: i64) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        let last_login = user
            .last_login
            .map(|at| at.timestamp().to_string())
            .unwrap_or_default();
        let user_id = user.id.to_string();
        let issued = timestamp.to_string();
        let parts: [&str; 7] = [
            purpose.as_str(),
            &user_id,
            &user.password_hash,
            if user.email_verified { "1" } else { "0" },
            &user.email,
            &last_login,
            &issued,
        ];
        for part in parts {
            mac.update(part.as_bytes());
            mac.update(b"\x1f");
        }
        mac
    }
}

/// URL-safe unpadded base64 of the user id
pub fn encode_uid(user_id: i64) -> String {
    BASE64URL_NOPAD.encode(user_id.to_string().as_bytes())
}

pub fn decode_uid(uidb64: &str) -> Option<i64> {
    let bytes = BASE64URL_NOPAD.decode(uidb64.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() || text.len() > 13 {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}
