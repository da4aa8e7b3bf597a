//! Listing repository
//!
//! The catalogue search is assembled by [`search_conditions`] and
//! [`order_clause`] so the page view and the AJAX endpoint run the very same
//! SQL.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Condition, Listing, ListingDraft, ListingFilter, ListingStatus, ListingTitleMatch, Price,
    SortKey,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::{fold_case, like_pattern};

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create(&self, seller_id: i64, draft: &ListingDraft) -> Result<Listing>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>>;

    /// Overwrite the editable fields; returns false when the listing is gone
    async fn update(&self, id: i64, draft: &ListingDraft) -> Result<bool>;

    async fn set_status(&self, id: i64, status: ListingStatus) -> Result<bool>;

    /// Atomically add one view; returns false when the listing is gone
    async fn increment_view_count(&self, id: i64) -> Result<bool>;

    /// One page of available listings matching the filter
    async fn search(&self, filter: &ListingFilter, offset: i64, limit: i64) -> Result<Vec<Listing>>;

    async fn count(&self, filter: &ListingFilter) -> Result<i64>;

    /// Every listing of a seller regardless of status, newest first
    async fn list_by_seller(&self, seller_id: i64) -> Result<Vec<Listing>>;

    /// Other available listings in the same category, newest first
    async fn related(&self, category_id: i64, exclude_id: i64, limit: i64) -> Result<Vec<Listing>>;

    /// Available listings whose title contains `query`
    async fn search_titles(&self, query: &str, limit: i64) -> Result<Vec<ListingTitleMatch>>;
}

pub struct SqlxListingRepository {
    pool: DynDatabasePool,
}

impl SqlxListingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ListingRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Bind value for dynamically assembled queries
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
}

const LISTING_COLUMNS: &str = "id, title, description, price_cents, category_id, subcategory_id, \
     item_condition, location, contact_telegram, status, view_count, seller_id, created_at, updated_at";

const INSERT_LISTING: &str = r#"
    INSERT INTO listings (title, description, title_folded, description_folded, price_cents,
                          category_id, subcategory_id, item_condition, location, location_folded,
                          contact_telegram, status, view_count, seller_id, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
"#;

const UPDATE_LISTING: &str = r#"
    UPDATE listings
    SET title = ?, description = ?, title_folded = ?, description_folded = ?, price_cents = ?,
        category_id = ?, subcategory_id = ?, item_condition = ?, location = ?, location_folded = ?,
        contact_telegram = ?, updated_at = ?
    WHERE id = ?
"#;

const SEARCH_TITLES: &str = r#"
    SELECT l.id, l.title, l.category_id, l.subcategory_id, c.name AS category_name
    FROM listings l
    JOIN categories c ON c.id = l.category_id
    WHERE l.status = 'available' AND l.title_folded LIKE ? ESCAPE '!'
    ORDER BY l.created_at DESC, l.id DESC
    LIMIT ?
"#;

/// WHERE clause and bind values for a catalogue search.
///
/// Only available listings are ever returned; every other predicate is
/// added only when the filter sets it.
pub fn search_conditions(filter: &ListingFilter) -> (String, Vec<SqlArg>) {
    let mut clauses = vec!["status = ?".to_string()];
    let mut args = vec![SqlArg::Text(ListingStatus::Available.as_str().to_string())];

    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        clauses.push(
            "(title_folded LIKE ? ESCAPE '!' OR description_folded LIKE ? ESCAPE '!')".to_string(),
        );
        args.push(SqlArg::Text(pattern.clone()));
        args.push(SqlArg::Text(pattern));
    }
    if let Some(category_id) = filter.category_id {
        clauses.push("category_id = ?".to_string());
        args.push(SqlArg::Int(category_id));
    }
    if let Some(subcategory_id) = filter.subcategory_id {
        clauses.push("subcategory_id = ?".to_string());
        args.push(SqlArg::Int(subcategory_id));
    }
    if let Some(condition) = filter.condition {
        clauses.push("item_condition = ?".to_string());
        args.push(SqlArg::Text(condition.as_str().to_string()));
    }
    if let Some(location) = &filter.location {
        clauses.push("location_folded = ?".to_string());
        args.push(SqlArg::Text(fold_case(location.trim())));
    }
    if let Some(min) = filter.min_price {
        clauses.push("price_cents >= ?".to_string());
        args.push(SqlArg::Int(min.cents()));
    }
    if let Some(max) = filter.max_price {
        clauses.push("price_cents <= ?".to_string());
        args.push(SqlArg::Int(max.cents()));
    }

    (format!("WHERE {}", clauses.join(" AND ")), args)
}

/// ORDER BY expression; the id tie-break keeps opposite sorts exact mirrors.
pub fn order_clause(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Newest => "created_at DESC, id DESC",
        SortKey::Oldest => "created_at ASC, id ASC",
        SortKey::PriceLow => "price_cents ASC, id ASC",
        SortKey::PriceHigh => "price_cents DESC, id DESC",
    }
}

fn search_sql(filter: &ListingFilter) -> (String, Vec<SqlArg>) {
    let (conditions, args) = search_conditions(filter);
    (
        format!(
            "SELECT {} FROM listings {} ORDER BY {} LIMIT ? OFFSET ?",
            LISTING_COLUMNS,
            conditions,
            order_clause(filter.sort)
        ),
        args,
    )
}

#[async_trait]
impl ListingRepository for SqlxListingRepository {
    async fn create(&self, seller_id: i64, draft: &ListingDraft) -> Result<Listing> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_listing_sqlite(self.pool.sqlite()?, seller_id, draft).await?
            }
            DatabaseDriver::Mysql => {
                create_listing_mysql(self.pool.mysql()?, seller_id, draft).await?
            }
        };
        self.get_by_id(id)
            .await?
            .context("Listing vanished right after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>> {
        let sql = format!("SELECT {} FROM listings WHERE id = ?", LISTING_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get listing")?;
                row.as_ref().map(row_to_listing_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get listing")?;
                row.as_ref().map(row_to_listing_mysql).transpose()
            }
        }
    }

    async fn update(&self, id: i64, draft: &ListingDraft) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(UPDATE_LISTING)
                .bind(&draft.title)
                .bind(&draft.description)
                .bind(fold_case(&draft.title))
                .bind(fold_case(&draft.description))
                .bind(draft.price.cents())
                .bind(draft.category_id)
                .bind(draft.subcategory_id)
                .bind(draft.condition.as_str())
                .bind(&draft.location)
                .bind(fold_case(draft.location.trim()))
                .bind(&draft.contact_telegram)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update listing")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(UPDATE_LISTING)
                .bind(&draft.title)
                .bind(&draft.description)
                .bind(fold_case(&draft.title))
                .bind(fold_case(&draft.description))
                .bind(draft.price.cents())
                .bind(draft.category_id)
                .bind(draft.subcategory_id)
                .bind(draft.condition.as_str())
                .bind(&draft.location)
                .bind(fold_case(draft.location.trim()))
                .bind(&draft.contact_telegram)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update listing")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn set_status(&self, id: i64, status: ListingStatus) -> Result<bool> {
        let sql = "UPDATE listings SET status = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update listing status")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update listing status")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn increment_view_count(&self, id: i64) -> Result<bool> {
        let sql = "UPDATE listings SET view_count = view_count + 1 WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to increment view count")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to increment view count")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn search(&self, filter: &ListingFilter, offset: i64, limit: i64) -> Result<Vec<Listing>> {
        let (sql, args) = search_sql(filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                search_sqlite(self.pool.sqlite()?, &sql, args, limit, offset).await
            }
            DatabaseDriver::Mysql => {
                search_mysql(self.pool.mysql()?, &sql, args, limit, offset).await
            }
        }
    }

    async fn count(&self, filter: &ListingFilter) -> Result<i64> {
        let (conditions, args) = search_conditions(filter);
        let sql = format!("SELECT COUNT(*) AS total FROM listings {}", conditions);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_sqlite(self.pool.sqlite()?, &sql, args).await,
            DatabaseDriver::Mysql => count_mysql(self.pool.mysql()?, &sql, args).await,
        }
    }

    async fn list_by_seller(&self, seller_id: i64) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE seller_id = ? ORDER BY created_at DESC, id DESC",
            LISTING_COLUMNS
        );
        let args = vec![SqlArg::Int(seller_id)];
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_listings_sqlite(self.pool.sqlite()?, &sql, args).await,
            DatabaseDriver::Mysql => fetch_listings_mysql(self.pool.mysql()?, &sql, args).await,
        }
    }

    async fn related(&self, category_id: i64, exclude_id: i64, limit: i64) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE category_id = ? AND status = 'available' AND id <> ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            LISTING_COLUMNS
        );
        let args = vec![SqlArg::Int(category_id), SqlArg::Int(exclude_id), SqlArg::Int(limit)];
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_listings_sqlite(self.pool.sqlite()?, &sql, args).await,
            DatabaseDriver::Mysql => fetch_listings_mysql(self.pool.mysql()?, &sql, args).await,
        }
    }

    async fn search_titles(&self, query: &str, limit: i64) -> Result<Vec<ListingTitleMatch>> {
        let pattern = like_pattern(query);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(SEARCH_TITLES)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to search listing titles")?;
                Ok(rows
                    .iter()
                    .map(|row| ListingTitleMatch {
                        listing_id: row.get("id"),
                        title: row.get("title"),
                        category_id: row.get("category_id"),
                        subcategory_id: row.get("subcategory_id"),
                        category_name: row.get("category_name"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(SEARCH_TITLES)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to search listing titles")?;
                Ok(rows
                    .iter()
                    .map(|row| ListingTitleMatch {
                        listing_id: row.get("id"),
                        title: row.get("title"),
                        category_id: row.get("category_id"),
                        subcategory_id: row.get("subcategory_id"),
                        category_name: row.get("category_name"),
                    })
                    .collect())
            }
        }
    }
}

fn parse_condition(raw: &str) -> Result<Condition> {
    raw.parse().context("Corrupt item_condition column")
}

fn parse_status(raw: &str) -> Result<ListingStatus> {
    raw.parse().context("Corrupt status column")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_listing_sqlite(pool: &SqlitePool, seller_id: i64, draft: &ListingDraft) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_LISTING)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(fold_case(&draft.title))
        .bind(fold_case(&draft.description))
        .bind(draft.price.cents())
        .bind(draft.category_id)
        .bind(draft.subcategory_id)
        .bind(draft.condition.as_str())
        .bind(&draft.location)
        .bind(fold_case(draft.location.trim()))
        .bind(&draft.contact_telegram)
        .bind(ListingStatus::Available.as_str())
        .bind(seller_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create listing")?;
    Ok(result.last_insert_rowid())
}

fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    args: Vec<SqlArg>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlArg::Text(text) => query.bind(text),
            SqlArg::Int(n) => query.bind(n),
        };
    }
    query
}

async fn search_sqlite(pool: &SqlitePool, sql: &str, args: Vec<SqlArg>, limit: i64, offset: i64) -> Result<Vec<Listing>> {
    let rows = bind_sqlite(sqlx::query(sql), args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to search listings")?;
    rows.iter().map(row_to_listing_sqlite).collect()
}

async fn fetch_listings_sqlite(pool: &SqlitePool, sql: &str, args: Vec<SqlArg>) -> Result<Vec<Listing>> {
    let rows = bind_sqlite(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to list listings")?;
    rows.iter().map(row_to_listing_sqlite).collect()
}

async fn count_sqlite(pool: &SqlitePool, sql: &str, args: Vec<SqlArg>) -> Result<i64> {
    let row = bind_sqlite(sqlx::query(sql), args)
        .fetch_one(pool)
        .await
        .context("Failed to count listings")?;
    Ok(row.get("total"))
}

fn row_to_listing_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Listing> {
    let condition: String = row.get("item_condition");
    let status: String = row.get("status");
    Ok(Listing {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price: Price::from_cents(row.get("price_cents")),
        category_id: row.get("category_id"),
        subcategory_id: row.get("subcategory_id"),
        condition: parse_condition(&condition)?,
        location: row.get("location"),
        contact_telegram: row.get("contact_telegram"),
        status: parse_status(&status)?,
        view_count: row.get("view_count"),
        seller_id: row.get("seller_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_listing_mysql(pool: &MySqlPool, seller_id: i64, draft: &ListingDraft) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_LISTING)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(fold_case(&draft.title))
        .bind(fold_case(&draft.description))
        .bind(draft.price.cents())
        .bind(draft.category_id)
        .bind(draft.subcategory_id)
        .bind(draft.condition.as_str())
        .bind(&draft.location)
        .bind(fold_case(draft.location.trim()))
        .bind(&draft.contact_telegram)
        .bind(ListingStatus::Available.as_str())
        .bind(seller_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create listing")?;
    Ok(result.last_insert_id() as i64)
}

fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    args: Vec<SqlArg>,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    for arg in args {
        query = match arg {
            SqlArg::Text(text) => query.bind(text),
            SqlArg::Int(n) => query.bind(n),
        };
    }
    query
}

async fn search_mysql(pool: &MySqlPool, sql: &str, args: Vec<SqlArg>, limit: i64, offset: i64) -> Result<Vec<Listing>> {
    let rows = bind_mysql(sqlx::query(sql), args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to search listings")?;
    rows.iter().map(row_to_listing_mysql).collect()
}

async fn fetch_listings_mysql(pool: &MySqlPool, sql: &str, args: Vec<SqlArg>) -> Result<Vec<Listing>> {
    let rows = bind_mysql(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to list listings")?;
    rows.iter().map(row_to_listing_mysql).collect()
}

async fn count_mysql(pool: &MySqlPool, sql: &str, args: Vec<SqlArg>) -> Result<i64> {
    let row = bind_mysql(sqlx::query(sql), args)
        .fetch_one(pool)
        .await
        .context("Failed to count listings")?;
    Ok(row.get("total"))
}

fn row_to_listing_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Listing> {
    let condition: String = row.get("item_condition");
    let status: String = row.get("status");
    Ok(Listing {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price: Price::from_cents(row.get("price_cents")),
        category_id: row.get("category_id"),
        subcategory_id: row.get("subcategory_id"),
        condition: parse_condition(&condition)?,
        location: row.get("location"),
        contact_telegram: row.get("contact_telegram"),
        status: parse_status(&status)?,
        view_count: row.get("view_count"),
        seller_id: row.get("seller_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_listing, insert_taxonomy, insert_user, setup_pool};
    use proptest::prelude::*;

    fn draft(category_id: i64, subcategory_id: i64, title: &str, cents: i64) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: format!("{} for sale", title),
            price: Price::from_cents(cents),
            category_id,
            subcategory_id,
            condition: Condition::Used,
            location: "Hawassa".to_string(),
            contact_telegram: "@seller".to_string(),
        }
    }

    #[test]
    fn test_search_conditions_only_status_by_default() {
        let (sql, args) = search_conditions(&ListingFilter::default());
        assert_eq!(sql, "WHERE status = ?");
        assert_eq!(args, vec![SqlArg::Text("available".to_string())]);
    }

    #[test]
    fn test_search_conditions_compose_every_predicate() {
        let filter = ListingFilter {
            search: Some("Phone".to_string()),
            category_id: Some(1),
            subcategory_id: Some(2),
            condition: Some(Condition::New),
            location: Some(" Addis Ababa ".to_string()),
            min_price: Some(Price::from_cents(100)),
            max_price: Some(Price::from_cents(900)),
            sort: SortKey::PriceLow,
        };
        let (sql, args) = search_conditions(&filter);
        assert_eq!(sql.matches(" AND ").count(), 7);
        assert_eq!(sql.matches('?').count(), args.len());
        assert!(args.contains(&SqlArg::Text("%phone%".to_string())));
        assert!(args.contains(&SqlArg::Text("addis ababa".to_string())));
        assert!(args.contains(&SqlArg::Int(900)));
    }

    #[tokio::test]
    async fn test_create_get_update_status() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "kebede").await;
        let (cat, sub) = insert_taxonomy(&pool, "Vehicles", "Cars").await;
        let repo = SqlxListingRepository::new(pool);

        let listing = repo.create(seller, &draft(cat, sub, "Corolla", 1_500_000_00)).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Available);
        assert_eq!(listing.view_count, 0);

        let mut changed = draft(cat, sub, "Corolla 2010", 1_400_000_00);
        changed.condition = Condition::New;
        assert!(repo.update(listing.id, &changed).await.unwrap());
        assert!(repo.set_status(listing.id, ListingStatus::Sold).await.unwrap());

        let stored = repo.get_by_id(listing.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Corolla 2010");
        assert_eq!(stored.condition, Condition::New);
        assert_eq!(stored.status, ListingStatus::Sold);
        assert!(!repo.set_status(9999, ListingStatus::Sold).await.unwrap());
    }

    #[tokio::test]
    async fn test_view_count_increments_by_one() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "s").await;
        let (cat, sub) = insert_taxonomy(&pool, "Pets", "Dogs").await;
        let id = insert_listing(&pool, seller, cat, sub, "Puppy", 5000).await;
        let repo = SqlxListingRepository::new(pool);

        for expected in 1..=5 {
            assert!(repo.increment_view_count(id).await.unwrap());
            assert_eq!(repo.get_by_id(id).await.unwrap().unwrap().view_count, expected);
        }
        assert!(!repo.increment_view_count(id + 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_filters_and_counts() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "s").await;
        let (phones, mobile) = insert_taxonomy(&pool, "Electronics", "Mobile Phones").await;
        let (_, laptops) = insert_taxonomy(&pool, "Electronics", "Laptops").await;
        let (vehicles, cars) = insert_taxonomy(&pool, "Vehicles", "Cars").await;
        insert_listing(&pool, seller, phones, mobile, "Samsung phone", 20_000).await;
        insert_listing(&pool, seller, phones, laptops, "ThinkPad laptop", 60_000).await;
        insert_listing(&pool, seller, vehicles, cars, "Vitz", 90_000_000).await;
        let hidden = insert_listing(&pool, seller, phones, mobile, "iPhone", 80_000).await;

        let repo = SqlxListingRepository::new(pool);
        repo.set_status(hidden, ListingStatus::Removed).await.unwrap();

        let all = ListingFilter::default();
        assert_eq!(repo.count(&all).await.unwrap(), 3);

        let electronics = ListingFilter { category_id: Some(phones), ..Default::default() };
        assert_eq!(repo.count(&electronics).await.unwrap(), 2);

        let text = ListingFilter { search: Some("GOOD SHAPE".to_string()), ..Default::default() };
        assert_eq!(repo.count(&text).await.unwrap(), 3);

        let priced = ListingFilter {
            min_price: Some(Price::from_cents(20_000)),
            max_price: Some(Price::from_cents(60_000)),
            ..Default::default()
        };
        let hits = repo.search(&priced, 0, 12).await.unwrap();
        assert_eq!(hits.len(), 2);

        let nothing = ListingFilter { category_id: Some(424242), ..Default::default() };
        assert!(repo.search(&nothing, 0, 12).await.unwrap().is_empty());

        let located = ListingFilter { location: Some("adama".to_string()), ..Default::default() };
        assert_eq!(repo.count(&located).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_related_and_seller_listings() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "s").await;
        let other = insert_user(&pool, "o").await;
        let (cat, sub) = insert_taxonomy(&pool, "Furniture", "Office").await;
        let main = insert_listing(&pool, seller, cat, sub, "Desk", 100).await;
        for i in 0..5 {
            insert_listing(&pool, other, cat, sub, &format!("Chair {}", i), 100).await;
        }
        let repo = SqlxListingRepository::new(pool);

        let related = repo.related(cat, main, 4).await.unwrap();
        assert_eq!(related.len(), 4);
        assert!(related.iter().all(|l| l.id != main));

        repo.set_status(main, ListingStatus::Removed).await.unwrap();
        let mine = repo.list_by_seller(seller).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, ListingStatus::Removed);
    }

    #[tokio::test]
    async fn test_search_titles_skips_unavailable() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "s").await;
        let (cat, sub) = insert_taxonomy(&pool, "Books & Media", "Books").await;
        insert_listing(&pool, seller, cat, sub, "Fikir Eske Mekabir", 300).await;
        let sold = insert_listing(&pool, seller, cat, sub, "Fikir Novel Reprint", 300).await;
        let repo = SqlxListingRepository::new(pool);
        repo.set_status(sold, ListingStatus::Sold).await.unwrap();

        let hits = repo.search_titles("fikir", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category_name, "Books & Media");
        assert_eq!(hits[0].subcategory_id, sub);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "s").await;
        let (cat, sub) = insert_taxonomy(&pool, "Electronics", "Mobile Phones").await;
        let repo = SqlxListingRepository::new(pool);

        let mut eclair = draft(cat, sub, "Éclair Téléphone", 4_500);
        eclair.location = " Ölbaum ".to_string();
        repo.create(seller, &eclair).await.unwrap();
        repo.create(seller, &draft(cat, sub, "Плита ДЕЛЮКС", 9_000)).await.unwrap();

        for query in ["éclair", "ÉCLAIR", "Éclair Télé"] {
            let filter = ListingFilter { search: Some(query.to_string()), ..Default::default() };
            assert_eq!(repo.count(&filter).await.unwrap(), 1, "search {:?}", query);
        }
        let cyrillic = ListingFilter { search: Some("делюкс".to_string()), ..Default::default() };
        assert_eq!(repo.count(&cyrillic).await.unwrap(), 1);

        let located = ListingFilter { location: Some("ÖLBAUM".to_string()), ..Default::default() };
        assert_eq!(repo.count(&located).await.unwrap(), 1);

        let hits = repo.search_titles("TÉLÉ", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Éclair Téléphone");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Opposite price sorts are exact mirrors when prices are distinct.
        #[test]
        fn price_sorts_are_reversed(prices in proptest::collection::btree_set(1i64..1_000_000, 2..15)) {
            let (low, high) = tokio_test::block_on(async {
                let pool = setup_pool().await;
                let seller = insert_user(&pool, "p").await;
                let (cat, sub) = insert_taxonomy(&pool, "Toys & Games", "Puzzles").await;
                for (i, cents) in prices.iter().enumerate() {
                    insert_listing(&pool, seller, cat, sub, &format!("Item {}", i), *cents).await;
                }
                let repo = SqlxListingRepository::new(pool);
                let ids = |sort| {
                    let filter = ListingFilter { sort, ..Default::default() };
                    let repo = &repo;
                    async move {
                        repo.search(&filter, 0, 100).await.unwrap().into_iter().map(|l| l.id).collect::<Vec<_>>()
                    }
                };
                (ids(SortKey::PriceLow).await, ids(SortKey::PriceHigh).await)
            });
            let mut reversed = high.clone();
            reversed.reverse();
            prop_assert_eq!(low, reversed);
        }

        /// Adding a predicate never grows the result set, and every hit
        /// satisfies each supplied predicate.
        #[test]
        fn filters_are_conjunctive(
            prices in proptest::collection::vec(0i64..10_000, 1..12),
            min in proptest::option::of(0i64..10_000),
            use_category in any::<bool>(),
        ) {
            let (unfiltered, filtered, violations) = tokio_test::block_on(async {
                let pool = setup_pool().await;
                let seller = insert_user(&pool, "c").await;
                let (a, a_sub) = insert_taxonomy(&pool, "Art & Crafts", "Pottery").await;
                let (b, b_sub) = insert_taxonomy(&pool, "Travel", "Tours").await;
                for (i, cents) in prices.iter().enumerate() {
                    let (cat, sub) = if i % 2 == 0 { (a, a_sub) } else { (b, b_sub) };
                    insert_listing(&pool, seller, cat, sub, &format!("Thing {}", i), *cents).await;
                }
                let repo = SqlxListingRepository::new(pool);
                let filter = ListingFilter {
                    category_id: if use_category { Some(a) } else { None },
                    min_price: min.map(Price::from_cents),
                    ..Default::default()
                };
                let hits = repo.search(&filter, 0, 100).await.unwrap();
                let violations = hits
                    .iter()
                    .filter(|l| {
                        (use_category && l.category_id != a)
                            || min.is_some_and(|m| l.price.cents() < m)
                    })
                    .count();
                let total = repo.count(&ListingFilter::default()).await.unwrap();
                (total, hits.len() as i64, violations)
            });
            prop_assert!(filtered <= unfiltered);
            prop_assert_eq!(violations, 0);
        }
    }
}
