//! Code-based schema migrations
//!
//! Each `Migration` carries the SQL for both backends. Applied versions are
//! tracked in `_migrations`, so `run_migrations` is safe to call on every
//! start.

use anyhow::{Context, Result};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, ascending)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(254) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                telegram_username VARCHAR(100) NOT NULL DEFAULT '',
                phone VARCHAR(20) NOT NULL DEFAULT '',
                location VARCHAR(100) NOT NULL DEFAULT '',
                email_verified BOOLEAN NOT NULL DEFAULT 0,
                last_login TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(254) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                telegram_username VARCHAR(100) NOT NULL DEFAULT '',
                phone VARCHAR(20) NOT NULL DEFAULT '',
                location VARCHAR(100) NOT NULL DEFAULT '',
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                last_login DATETIME(6) NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                INDEX idx_sessions_user (user_id),
                CONSTRAINT fk_sessions_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 3,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                name_folded VARCHAR(100) NOT NULL DEFAULT '',
                slug VARCHAR(100) NOT NULL UNIQUE,
                icon VARCHAR(50) NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS subcategories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                name VARCHAR(100) NOT NULL,
                name_folded VARCHAR(100) NOT NULL DEFAULT '',
                slug VARCHAR(100) NOT NULL,
                icon VARCHAR(50) NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL,
                UNIQUE (category_id, slug)
            );
            CREATE INDEX IF NOT EXISTS idx_subcategories_category ON subcategories(category_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                name_folded VARCHAR(100) NOT NULL DEFAULT '',
                slug VARCHAR(100) NOT NULL UNIQUE,
                icon VARCHAR(50) NOT NULL DEFAULT '',
                created_at DATETIME(6) NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS subcategories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                category_id BIGINT NOT NULL,
                name VARCHAR(100) NOT NULL,
                name_folded VARCHAR(100) NOT NULL DEFAULT '',
                slug VARCHAR(100) NOT NULL,
                icon VARCHAR(50) NOT NULL DEFAULT '',
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_subcategory_slug (category_id, slug),
                CONSTRAINT fk_subcategories_category FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 4,
        name: "create_listings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                title_folded VARCHAR(200) NOT NULL DEFAULT '',
                description_folded TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                subcategory_id INTEGER NOT NULL REFERENCES subcategories(id) ON DELETE CASCADE,
                item_condition VARCHAR(10) NOT NULL,
                location VARCHAR(100) NOT NULL,
                location_folded VARCHAR(100) NOT NULL DEFAULT '',
                contact_telegram VARCHAR(100) NOT NULL,
                status VARCHAR(10) NOT NULL DEFAULT 'available',
                view_count INTEGER NOT NULL DEFAULT 0,
                seller_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_listings_status_created ON listings(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_listings_category ON listings(category_id);
            CREATE INDEX IF NOT EXISTS idx_listings_seller ON listings(seller_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS listings (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                title_folded VARCHAR(200) NOT NULL DEFAULT '',
                description_folded TEXT NOT NULL,
                price_cents BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                subcategory_id BIGINT NOT NULL,
                item_condition VARCHAR(10) NOT NULL,
                location VARCHAR(100) NOT NULL,
                location_folded VARCHAR(100) NOT NULL DEFAULT '',
                contact_telegram VARCHAR(100) NOT NULL,
                status VARCHAR(10) NOT NULL DEFAULT 'available',
                view_count BIGINT NOT NULL DEFAULT 0,
                seller_id BIGINT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                INDEX idx_listings_status_created (status, created_at),
                INDEX idx_listings_category (category_id),
                INDEX idx_listings_seller (seller_id),
                CONSTRAINT fk_listings_category FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE,
                CONSTRAINT fk_listings_subcategory FOREIGN KEY (subcategory_id) REFERENCES subcategories(id) ON DELETE CASCADE,
                CONSTRAINT fk_listings_seller FOREIGN KEY (seller_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 5,
        name: "create_listing_images",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS listing_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                image_ref VARCHAR(255) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_listing_images_listing ON listing_images(listing_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS listing_images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                listing_id BIGINT NOT NULL,
                image_ref VARCHAR(255) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                INDEX idx_listing_images_listing (listing_id),
                CONSTRAINT fk_listing_images_listing FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
];

/// Apply every pending migration in version order, returning how many ran.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)).collect();

    for migration in &pending {
        tracing::info!(version = migration.version, "Migrating: {}", migration.name);
        apply_migration(pool, migration).await?;
    }
    if pending.is_empty() {
        tracing::debug!("Schema is current");
    }
    Ok(pending.len())
}

/// Whether every known migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    create_migrations_table(pool).await?;
    Ok(applied_versions(pool).await?.len() == MIGRATIONS.len())
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => applied_versions_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => applied_versions_mysql(pool.mysql()?).await,
    }
}

async fn applied_versions_sqlite(pool: &SqlitePool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("version") as i32).collect())
}

async fn applied_versions_mysql(pool: &MySqlPool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i32, _>("version")).collect())
}

/// Run one migration's statements for the active backend and record it.
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let body = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };
    for statement in split_sql_statements(body) {
        pool.execute(statement)
            .await
            .with_context(|| format!("{} failed at: {}", migration.name, truncate_sql(statement)))?;
    }

    let record = "INSERT INTO _migrations (version, name) VALUES (?, ?)";
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool.sqlite()?)
                .await?;
        }
        DatabaseDriver::Mysql => {
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool.mysql()?)
                .await?;
        }
    }
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a migration body into statements on `;`, dropping comment-only chunks
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}
