//! Connection pools for the two supported backends

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Pool handle shared by repositories and migrations.
///
/// Exactly one of `as_sqlite` / `as_mysql` returns `Some`, matching
/// [`DatabasePool::driver`].
#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Run a statement with no bind parameters (DDL, pragmas)
    async fn execute(&self, statement: &str) -> Result<u64>;

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()>;

    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite()
            .with_context(|| format!("Expected a SQLite pool, found {:?}", self.driver()))
    }

    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql()
            .with_context(|| format!("Expected a MySQL pool, found {:?}", self.driver()))
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// SQLite file (or in-memory) database
pub struct SqliteDatabase {
    pool: SqlitePool,
}

/// Where a configured SQLite database lives
#[derive(Debug, PartialEq, Eq)]
enum SqliteTarget<'a> {
    Memory,
    File(&'a str),
}

impl<'a> SqliteTarget<'a> {
    fn parse(url: &'a str) -> Self {
        if url == ":memory:" || url.starts_with("sqlite::memory:") {
            return SqliteTarget::Memory;
        }
        let path = url.strip_prefix("sqlite:").unwrap_or(url);
        SqliteTarget::File(path.split('?').next().unwrap_or(path))
    }
}

/// sqlx URL for a configured location; files are created on first use
/// unless the URL already names a mode.
fn sqlite_url(url: &str) -> String {
    match (SqliteTarget::parse(url), url.strip_prefix("sqlite:")) {
        (SqliteTarget::Memory, _) => "sqlite::memory:".to_string(),
        (_, Some(_)) if url.contains('?') => url.to_string(),
        (_, Some(rest)) => format!("sqlite:{}?mode=rwc", rest),
        (_, None) => format!("sqlite:{}?mode=rwc", url),
    }
}

impl SqliteDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let target = SqliteTarget::parse(url);
        let options = match target {
            // each connection to sqlite::memory: is a separate database
            SqliteTarget::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            SqliteTarget::File(path) => {
                let dir = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty());
                if let Some(dir) = dir {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("Cannot create database directory {}", dir.display()))?;
                }
                SqlitePoolOptions::new().max_connections(20)
            }
        };

        let pool = options
            .connect(&sqlite_url(url))
            .await
            .with_context(|| format!("Cannot open SQLite database at {}", url))?;
        let db = Self { pool };
        db.execute("PRAGMA foreign_keys = ON").await?;
        Ok(db)
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let done = sqlx::query(statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("SQLite statement failed: {}", statement))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("SQLite is unreachable")?;
        Ok(())
    }
}

/// MySQL server database
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let url = match url.strip_prefix("mysql://") {
            Some(_) => url.to_string(),
            None => format!("mysql://{}", url),
        };
        let pool = MySqlPoolOptions::new()
            .max_connections(30)
            .connect(&url)
            .await
            .context("Cannot connect to MySQL")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let done = sqlx::query(statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("MySQL statement failed: {}", statement))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("MySQL is unreachable")?;
        Ok(())
    }
}

/// Open the pool named by the `database` config section.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::new(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::new(&config.url).await?),
    };
    tracing::debug!(driver = ?config.driver, "Database pool ready");
    Ok(pool)
}

/// Empty in-memory SQLite database
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_locations() {
        assert_eq!(SqliteTarget::parse(":memory:"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("sqlite::memory:?cache=shared"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("sqlite:dir/x.db?mode=rwc"), SqliteTarget::File("dir/x.db"));
        assert_eq!(SqliteTarget::parse("data/bazaar.db"), SqliteTarget::File("data/bazaar.db"));

        assert_eq!(sqlite_url(":memory:"), "sqlite::memory:");
        assert_eq!(sqlite_url("data/bazaar.db"), "sqlite:data/bazaar.db?mode=rwc");
        assert_eq!(sqlite_url("sqlite:x.db"), "sqlite:x.db?mode=rwc");
        assert_eq!(sqlite_url("sqlite:x.db?mode=ro"), "sqlite:x.db?mode=ro");
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_its_schema() {
        let pool = create_test_pool().await.expect("memory pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.mysql().is_err());

        pool.execute("CREATE TABLE stalls (id INTEGER PRIMARY KEY)").await.unwrap();
        // a second statement must land on the same database
        assert_eq!(pool.execute("INSERT INTO stalls (id) VALUES (1)").await.unwrap(), 1);
        pool.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("var").join("bazaar.db");
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: db_path.to_string_lossy().into_owned(),
        };

        let pool = create_pool(&config).await.unwrap();
        pool.ping().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_ping() {
        let url = std::env::var("MYSQL_TEST_URL").unwrap_or_else(|_| "mysql://root@localhost/bazaar_test".to_string());
        let pool = create_pool(&DatabaseConfig { driver: DatabaseDriver::Mysql, url }).await.unwrap();
        assert!(pool.sqlite().is_err());
        pool.ping().await.unwrap();
    }
}
