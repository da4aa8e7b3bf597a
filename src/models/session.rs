//! Login sessions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A browser login. `id` is the random token stored in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Fresh token for `user_id`, valid for `days` from `now`
    pub fn issue(user_id: i64, now: DateTime<Utc>, days: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(days),
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_sessions_are_unique_and_live() {
        let now = Utc::now();
        let a = Session::issue(1, now, 14);
        let b = Session::issue(1, now, 14);
        assert_ne!(a.id, b.id);
        assert_eq!(a.expires_at - a.created_at, Duration::days(14));
        assert!(!a.is_expired());
        assert!(Session::issue(1, now, -1).is_expired());
    }
}
