//! User repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{NewUser, ProfileUpdate, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact match on the (already normalised) email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Case-insensitive match on the username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<()>;

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn set_email_verified(&self, id: i64, verified: bool) -> Result<()>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Remove the user together with their listings, images and sessions in
    /// one transaction. Returns false when no such user existed.
    async fn delete_account(&self, id: i64) -> Result<bool>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, telegram_username, phone, \
     location, email_verified, last_login, created_at, updated_at";

const INSERT_USER: &str = r#"
    INSERT INTO users (username, email, password_hash, telegram_username, phone, location,
                       email_verified, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Statements run, in order, inside the account deletion transaction.
const DELETE_ACCOUNT_STATEMENTS: [&str; 4] = [
    "DELETE FROM listing_images WHERE listing_id IN (SELECT id FROM listings WHERE seller_id = ?)",
    "DELETE FROM listings WHERE seller_id = ?",
    "DELETE FROM sessions WHERE user_id = ?",
    "DELETE FROM users WHERE id = ?",
];

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await?,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await?,
        };
        self.get_by_id(id)
            .await?
            .context("User vanished right after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_user_sqlite(self.pool.sqlite()?, &sql, id).await,
            DatabaseDriver::Mysql => fetch_user_mysql(self.pool.mysql()?, &sql, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_user_sqlite(self.pool.sqlite()?, &sql, email).await,
            DatabaseDriver::Mysql => fetch_user_mysql(self.pool.mysql()?, &sql, email).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE LOWER(username) = LOWER(?)", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_user_sqlite(self.pool.sqlite()?, &sql, username).await
            }
            DatabaseDriver::Mysql => {
                fetch_user_mysql(self.pool.mysql()?, &sql, username).await
            }
        }
    }

    async fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<()> {
        let sql = "UPDATE users SET telegram_username = ?, phone = ?, location = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&profile.telegram_username)
                    .bind(&profile.phone)
                    .bind(&profile.location)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update profile")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&profile.telegram_username)
                    .bind(&profile.phone)
                    .bind(&profile.location)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update profile")?;
            }
        }
        Ok(())
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to set password")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to set password")?;
            }
        }
        Ok(())
    }

    async fn set_email_verified(&self, id: i64, verified: bool) -> Result<()> {
        let sql = "UPDATE users SET email_verified = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(verified)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update email verification")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(verified)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update email verification")?;
            }
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET last_login = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to record last login")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to record last login")?;
            }
        }
        Ok(())
    }

    async fn delete_account(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_account_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_account_mysql(self.pool.mysql()?, id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.telegram_username)
        .bind(&user.phone)
        .bind(&user.location)
        .bind(false)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    Ok(result.last_insert_rowid())
}

async fn fetch_user_sqlite<'q, T>(pool: &SqlitePool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;
    Ok(row.map(|row| row_to_user_sqlite(&row)))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        telegram_username: row.get("telegram_username"),
        phone: row.get("phone"),
        location: row.get("location"),
        email_verified: row.get("email_verified"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn delete_account_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut removed = 0;
    for statement in DELETE_ACCOUNT_STATEMENTS {
        removed = sqlx::query(statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete account")?
            .rows_affected();
    }
    tx.commit().await.context("Failed to commit account deletion")?;
    Ok(removed > 0)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &NewUser) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.telegram_username)
        .bind(&user.phone)
        .bind(&user.location)
        .bind(false)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    Ok(result.last_insert_id() as i64)
}

async fn fetch_user_mysql<'q, T>(pool: &MySqlPool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;
    Ok(row.map(|row| row_to_user_mysql(&row)))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        telegram_username: row.get("telegram_username"),
        phone: row.get("phone"),
        location: row.get("location"),
        email_verified: row.get("email_verified"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn delete_account_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut removed = 0;
    for statement in DELETE_ACCOUNT_STATEMENTS {
        removed = sqlx::query(statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete account")?
            .rows_affected();
    }
    tx.commit().await.context("Failed to commit account deletion")?;
    Ok(removed > 0)
}
