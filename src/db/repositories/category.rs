//! Category and subcategory repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Category, SubCategory, SubCategoryMatch};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::{fold_case, like_pattern};

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    async fn create(&self, name: &str, slug: &str, icon: &str) -> Result<Category>;

    /// Subcategories of one category ordered by name
    async fn list_subcategories(&self, category_id: i64) -> Result<Vec<SubCategory>>;

    async fn get_subcategory(&self, id: i64) -> Result<Option<SubCategory>>;

    async fn get_subcategory_by_name(&self, category_id: i64, name: &str) -> Result<Option<SubCategory>>;

    async fn create_subcategory(&self, category_id: i64, name: &str, slug: &str, icon: &str) -> Result<SubCategory>;

    /// Categories whose name contains `query`, case-insensitively
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Category>>;

    /// Subcategories whose name contains `query`, with their parent's name
    async fn search_subcategories(&self, query: &str, limit: i64) -> Result<Vec<SubCategoryMatch>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, icon, created_at";
const SUBCATEGORY_COLUMNS: &str = "id, category_id, name, slug, icon, created_at";

const SEARCH_SUBCATEGORIES: &str = r#"
    SELECT s.id, s.category_id, s.name, s.slug, s.icon, s.created_at, c.name AS category_name
    FROM subcategories s
    JOIN categories c ON c.id = s.category_id
    WHERE s.name_folded LIKE ? ESCAPE '!'
    ORDER BY s.name, s.id
    LIMIT ?
"#;

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY name", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE name = ?", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(name)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category by name")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(name)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category by name")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn create(&self, name: &str, slug: &str, icon: &str) -> Result<Category> {
        let sql = "INSERT INTO categories (name, name_folded, slug, icon, created_at) VALUES (?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(name)
                .bind(fold_case(name))
                .bind(slug)
                .bind(icon)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(name)
                .bind(fold_case(name))
                .bind(slug)
                .bind(icon)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };
        Ok(Category {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            icon: icon.to_string(),
            created_at: now,
        })
    }

    async fn list_subcategories(&self, category_id: i64) -> Result<Vec<SubCategory>> {
        let sql = format!(
            "SELECT {} FROM subcategories WHERE category_id = ? ORDER BY name",
            SUBCATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(category_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list subcategories")?;
                Ok(rows.iter().map(row_to_subcategory_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(category_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list subcategories")?;
                Ok(rows.iter().map(row_to_subcategory_mysql).collect())
            }
        }
    }

    async fn get_subcategory(&self, id: i64) -> Result<Option<SubCategory>> {
        let sql = format!("SELECT {} FROM subcategories WHERE id = ?", SUBCATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get subcategory")?;
                Ok(row.as_ref().map(row_to_subcategory_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get subcategory")?;
                Ok(row.as_ref().map(row_to_subcategory_mysql))
            }
        }
    }

    async fn get_subcategory_by_name(&self, category_id: i64, name: &str) -> Result<Option<SubCategory>> {
        let sql = format!(
            "SELECT {} FROM subcategories WHERE category_id = ? AND name = ?",
            SUBCATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(category_id)
                    .bind(name)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get subcategory by name")?;
                Ok(row.as_ref().map(row_to_subcategory_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(category_id)
                    .bind(name)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get subcategory by name")?;
                Ok(row.as_ref().map(row_to_subcategory_mysql))
            }
        }
    }

    async fn create_subcategory(&self, category_id: i64, name: &str, slug: &str, icon: &str) -> Result<SubCategory> {
        let sql = "INSERT INTO subcategories (category_id, name, name_folded, slug, icon, created_at) \
                   VALUES (?, ?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(category_id)
                .bind(name)
                .bind(fold_case(name))
                .bind(slug)
                .bind(icon)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create subcategory")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(category_id)
                .bind(name)
                .bind(fold_case(name))
                .bind(slug)
                .bind(icon)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create subcategory")?
                .last_insert_id() as i64,
        };
        Ok(SubCategory {
            id,
            category_id,
            name: name.to_string(),
            slug: slug.to_string(),
            icon: icon.to_string(),
            created_at: now,
        })
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE name_folded LIKE ? ESCAPE '!' ORDER BY name LIMIT ?",
            CATEGORY_COLUMNS
        );
        let pattern = like_pattern(query);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to search categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to search categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn search_subcategories(&self, query: &str, limit: i64) -> Result<Vec<SubCategoryMatch>> {
        let pattern = like_pattern(query);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                search_subcategories_sqlite(self.pool.sqlite()?, &pattern, limit).await
            }
            DatabaseDriver::Mysql => {
                search_subcategories_mysql(self.pool.mysql()?, &pattern, limit).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        created_at: row.get("created_at"),
    }
}

fn row_to_subcategory_sqlite(row: &sqlx::sqlite::SqliteRow) -> SubCategory {
    SubCategory {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        created_at: row.get("created_at"),
    }
}

async fn search_subcategories_sqlite(pool: &SqlitePool, pattern: &str, limit: i64) -> Result<Vec<SubCategoryMatch>> {
    let rows = sqlx::query(SEARCH_SUBCATEGORIES)
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to search subcategories")?;
    Ok(rows
        .iter()
        .map(|row| SubCategoryMatch {
            subcategory: row_to_subcategory_sqlite(row),
            category_name: row.get("category_name"),
        })
        .collect())
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        created_at: row.get("created_at"),
    }
}

fn row_to_subcategory_mysql(row: &sqlx::mysql::MySqlRow) -> SubCategory {
    SubCategory {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        created_at: row.get("created_at"),
    }
}

async fn search_subcategories_mysql(pool: &MySqlPool, pattern: &str, limit: i64) -> Result<Vec<SubCategoryMatch>> {
    let rows = sqlx::query(SEARCH_SUBCATEGORIES)
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to search subcategories")?;
    Ok(rows
        .iter()
        .map(|row| SubCategoryMatch {
            subcategory: row_to_subcategory_mysql(row),
            category_name: row.get("category_name"),
        })
        .collect())
}
