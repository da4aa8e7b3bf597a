//! Login sessions
//!
//! Rows are keyed by the cookie token and cascade away with their user.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Session for a cookie token, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// End every login of a user; returns how many were removed.
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run a DELETE keyed by one value on whichever backend is active
    async fn delete_where(&self, sql: &str, key: DeleteKey<'_>) -> Result<u64> {
        let affected = match (self.pool.driver(), key) {
            (DatabaseDriver::Sqlite, DeleteKey::Token(id)) => {
                sqlx::query(sql).bind(id).execute(self.pool.sqlite()?).await.map(|r| r.rows_affected())
            }
            (DatabaseDriver::Sqlite, DeleteKey::User(user_id)) => {
                sqlx::query(sql).bind(user_id).execute(self.pool.sqlite()?).await.map(|r| r.rows_affected())
            }
            (DatabaseDriver::Sqlite, DeleteKey::ExpiredBefore(at)) => {
                sqlx::query(sql).bind(at).execute(self.pool.sqlite()?).await.map(|r| r.rows_affected())
            }
            (DatabaseDriver::Mysql, DeleteKey::Token(id)) => {
                sqlx::query(sql).bind(id).execute(self.pool.mysql()?).await.map(|r| r.rows_affected())
            }
            (DatabaseDriver::Mysql, DeleteKey::User(user_id)) => {
                sqlx::query(sql).bind(user_id).execute(self.pool.mysql()?).await.map(|r| r.rows_affected())
            }
            (DatabaseDriver::Mysql, DeleteKey::ExpiredBefore(at)) => {
                sqlx::query(sql).bind(at).execute(self.pool.mysql()?).await.map(|r| r.rows_affected())
            }
        };
        affected.with_context(|| format!("Failed to run {}", sql))
    }
}

#[derive(Clone, Copy)]
enum DeleteKey<'a> {
    Token(&'a str),
    User(i64),
    ExpiredBefore(DateTime<Utc>),
}

const INSERT_SESSION: &str = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SESSION: &str = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";

/// Column values of a session row, read the same way on both backends
struct SessionRow {
    id: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_SESSION)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_SESSION)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        };
        result.with_context(|| format!("Failed to store session for user {}", session.user_id))?;
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to load session")?
                .map(|row| SessionRow {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to load session")?
                .map(|row| SessionRow {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(row.map(Session::from))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_where("DELETE FROM sessions WHERE id = ?", DeleteKey::Token(id)).await?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        self.delete_where("DELETE FROM sessions WHERE user_id = ?", DeleteKey::User(user_id)).await
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        self.delete_where("DELETE FROM sessions WHERE expires_at < ?", DeleteKey::ExpiredBefore(now)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    #[tokio::test]
    async fn test_session_round_trip() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "selam").await;
        let repo = SqlxSessionRepository::new(pool);

        let session = Session::issue(user_id, Utc::now(), 7);
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().expect("stored session");
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());
        assert!(repo.get_by_id("no-such-token").await.unwrap().is_none());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user_spares_other_users() {
        let pool = setup_pool().await;
        let abebe = insert_user(&pool, "abebe").await;
        let hana = insert_user(&pool, "hana").await;
        let repo = SqlxSessionRepository::new(pool);
        let now = Utc::now();

        repo.create(&Session::issue(abebe, now, 7)).await.unwrap();
        repo.create(&Session::issue(abebe, now, 7)).await.unwrap();
        let kept = Session::issue(hana, now, 7);
        repo.create(&kept).await.unwrap();

        assert_eq!(repo.delete_by_user(abebe).await.unwrap(), 2);
        assert!(repo.get_by_id(&kept.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "tigist").await;
        let repo = SqlxSessionRepository::new(pool);
        let now = Utc::now();

        let stale = Session::issue(user_id, now, -1);
        let live = Session::issue(user_id, now, 1);
        repo.create(&stale).await.unwrap();
        repo.create(&live).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&stale.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }
}
