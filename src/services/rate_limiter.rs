//! Login attempt limiter
//!
//! Failed logins are counted per email address inside a sliding window.
//! Once the count reaches the limit the address is locked until the oldest
//! attempt leaves the window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::SecurityConfig;

pub struct LoginRateLimiter {
    attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(
            config.max_login_attempts as usize,
            Duration::minutes(config.lockout_minutes as i64),
        )
    }

    pub async fn is_limited(&self, key: &str) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = Utc::now() - self.window;
        match attempts.get_mut(&key.to_lowercase()) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= self.max_attempts
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, key: &str) {
        let mut attempts = self.attempts.write().await;
        attempts.entry(key.to_lowercase()).or_default().push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, key: &str) {
        self.attempts.write().await.remove(&key.to_lowercase());
    }

    /// Drop expired attempts; called by a periodic background task
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.attempts.read().await.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let limiter = LoginRateLimiter::new(3, Duration::minutes(15));
        for _ in 0..2 {
            limiter.record_failure("hana@example.com").await;
            assert!(!limiter.is_limited("hana@example.com").await);
        }
        limiter.record_failure("HANA@example.com").await;
        assert!(limiter.is_limited("hana@example.com").await);

        limiter.clear("hana@example.com").await;
        assert!(!limiter.is_limited("hana@example.com").await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = LoginRateLimiter::new(1, Duration::zero());
        limiter.record_failure("a@example.com").await;
        assert!(!limiter.is_limited("a@example.com").await);

        limiter.record_failure("b@example.com").await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }
}
