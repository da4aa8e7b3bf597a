//! Listing image repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::ListingImage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ListingImageRepository: Send + Sync {
    async fn insert(&self, listing_id: i64, image_ref: &str, is_primary: bool) -> Result<ListingImage>;

    /// Images of one listing in insertion order
    async fn list_for_listing(&self, listing_id: i64) -> Result<Vec<ListingImage>>;

    /// Images of several listings at once, grouped by listing then id
    async fn list_for_listings(&self, listing_ids: &[i64]) -> Result<Vec<ListingImage>>;

    /// Set the primary flag of one image of a listing
    async fn set_primary(&self, listing_id: i64, image_id: i64, is_primary: bool) -> Result<bool>;

    /// Delete an image only if it belongs to the listing
    async fn delete(&self, listing_id: i64, image_id: i64) -> Result<Option<ListingImage>>;

    /// Keep only the lowest-id primary flag; returns how many flags were cleared
    async fn enforce_single_primary(&self, listing_id: i64) -> Result<u64>;
}

pub struct SqlxListingImageRepository {
    pool: DynDatabasePool,
}

impl SqlxListingImageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ListingImageRepository> {
        Arc::new(Self::new(pool))
    }
}

const IMAGE_COLUMNS: &str = "id, listing_id, image_ref, is_primary, created_at";
const INSERT_IMAGE: &str =
    "INSERT INTO listing_images (listing_id, image_ref, is_primary, created_at) VALUES (?, ?, ?, ?)";
const FIRST_PRIMARY: &str =
    "SELECT MIN(id) AS keep_id FROM listing_images WHERE listing_id = ? AND is_primary = 1";
const CLEAR_OTHER_PRIMARIES: &str =
    "UPDATE listing_images SET is_primary = 0 WHERE listing_id = ? AND is_primary = 1 AND id <> ?";

fn in_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl ListingImageRepository for SqlxListingImageRepository {
    async fn insert(&self, listing_id: i64, image_ref: &str, is_primary: bool) -> Result<ListingImage> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_IMAGE)
                .bind(listing_id)
                .bind(image_ref)
                .bind(is_primary)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to insert listing image")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_IMAGE)
                .bind(listing_id)
                .bind(image_ref)
                .bind(is_primary)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to insert listing image")?
                .last_insert_id() as i64,
        };
        Ok(ListingImage {
            id,
            listing_id,
            image_ref: image_ref.to_string(),
            is_primary,
            created_at: now,
        })
    }

    async fn list_for_listing(&self, listing_id: i64) -> Result<Vec<ListingImage>> {
        self.list_for_listings(&[listing_id]).await
    }

    async fn list_for_listings(&self, listing_ids: &[i64]) -> Result<Vec<ListingImage>> {
        if listing_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM listing_images WHERE listing_id IN ({}) ORDER BY listing_id, id",
            IMAGE_COLUMNS,
            in_placeholders(listing_ids.len())
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sqlite(self.pool.sqlite()?, &sql, listing_ids).await,
            DatabaseDriver::Mysql => list_mysql(self.pool.mysql()?, &sql, listing_ids).await,
        }
    }

    async fn set_primary(&self, listing_id: i64, image_id: i64, is_primary: bool) -> Result<bool> {
        let sql = "UPDATE listing_images SET is_primary = ? WHERE id = ? AND listing_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(is_primary)
                .bind(image_id)
                .bind(listing_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update image primary flag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(is_primary)
                .bind(image_id)
                .bind(listing_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update image primary flag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, listing_id: i64, image_id: i64) -> Result<Option<ListingImage>> {
        let existing = self
            .list_for_listing(listing_id)
            .await?
            .into_iter()
            .find(|image| image.id == image_id);
        let Some(image) = existing else {
            return Ok(None);
        };

        let sql = "DELETE FROM listing_images WHERE id = ? AND listing_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(image_id)
                    .bind(listing_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete listing image")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(image_id)
                    .bind(listing_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete listing image")?;
            }
        }
        Ok(Some(image))
    }

    async fn enforce_single_primary(&self, listing_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => repair_primary_sqlite(self.pool.sqlite()?, listing_id).await,
            DatabaseDriver::Mysql => repair_primary_mysql(self.pool.mysql()?, listing_id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_sqlite(pool: &SqlitePool, sql: &str, listing_ids: &[i64]) -> Result<Vec<ListingImage>> {
    let mut query = sqlx::query(sql);
    for id in listing_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list listing images")?;
    Ok(rows
        .iter()
        .map(|row| ListingImage {
            id: row.get("id"),
            listing_id: row.get("listing_id"),
            image_ref: row.get("image_ref"),
            is_primary: row.get("is_primary"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn repair_primary_sqlite(pool: &SqlitePool, listing_id: i64) -> Result<u64> {
    let keep: Option<i64> = sqlx::query(FIRST_PRIMARY)
        .bind(listing_id)
        .fetch_one(pool)
        .await
        .context("Failed to find first primary image")?
        .get("keep_id");
    let Some(keep) = keep else {
        return Ok(0);
    };
    let cleared = sqlx::query(CLEAR_OTHER_PRIMARIES)
        .bind(listing_id)
        .bind(keep)
        .execute(pool)
        .await
        .context("Failed to clear extra primary images")?
        .rows_affected();
    Ok(cleared)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_mysql(pool: &MySqlPool, sql: &str, listing_ids: &[i64]) -> Result<Vec<ListingImage>> {
    let mut query = sqlx::query(sql);
    for id in listing_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list listing images")?;
    Ok(rows
        .iter()
        .map(|row| ListingImage {
            id: row.get("id"),
            listing_id: row.get("listing_id"),
            image_ref: row.get("image_ref"),
            is_primary: row.get("is_primary"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn repair_primary_mysql(pool: &MySqlPool, listing_id: i64) -> Result<u64> {
    let keep: Option<i64> = sqlx::query(FIRST_PRIMARY)
        .bind(listing_id)
        .fetch_one(pool)
        .await
        .context("Failed to find first primary image")?
        .get("keep_id");
    let Some(keep) = keep else {
        return Ok(0);
    };
    let cleared = sqlx::query(CLEAR_OTHER_PRIMARIES)
        .bind(listing_id)
        .bind(keep)
        .execute(pool)
        .await
        .context("Failed to clear extra primary images")?
        .rows_affected();
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_listing, insert_taxonomy, insert_user, setup_pool};
    use crate::models::primary_image;

    async fn listing_fixture() -> (DynDatabasePool, i64) {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let (cat, sub) = insert_taxonomy(&pool, "Electronics", "Cameras").await;
        let listing = insert_listing(&pool, seller, cat, sub, "Canon", 10_000).await;
        (pool, listing)
    }

    #[tokio::test]
    async fn test_repair_keeps_first_inserted_primary() {
        let (pool, listing) = listing_fixture().await;
        let repo = SqlxListingImageRepository::new(pool);
        let a = repo.insert(listing, "listings/a", true).await.unwrap();
        let b = repo.insert(listing, "listings/b", true).await.unwrap();
        repo.insert(listing, "listings/c", false).await.unwrap();

        assert_eq!(repo.enforce_single_primary(listing).await.unwrap(), 1);

        let images = repo.list_for_listing(listing).await.unwrap();
        let flagged: Vec<i64> = images.iter().filter(|i| i.is_primary).map(|i| i.id).collect();
        assert_eq!(flagged, vec![a.id]);
        assert!(!images.iter().find(|i| i.id == b.id).unwrap().is_primary);
        assert_eq!(primary_image(&images).unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_repair_without_primary_is_noop() {
        let (pool, listing) = listing_fixture().await;
        let repo = SqlxListingImageRepository::new(pool);
        let first = repo.insert(listing, "listings/x", false).await.unwrap();
        repo.insert(listing, "listings/y", false).await.unwrap();

        assert_eq!(repo.enforce_single_primary(listing).await.unwrap(), 0);
        let images = repo.list_for_listing(listing).await.unwrap();
        assert!(images.iter().all(|i| !i.is_primary));
        assert_eq!(primary_image(&images).unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_delete_requires_matching_listing() {
        let (pool, listing) = listing_fixture().await;
        let repo = SqlxListingImageRepository::new(pool);
        let image = repo.insert(listing, "listings/a", false).await.unwrap();

        assert!(repo.delete(listing + 1, image.id).await.unwrap().is_none());
        let removed = repo.delete(listing, image.id).await.unwrap().unwrap();
        assert_eq!(removed.image_ref, "listings/a");
        assert!(repo.list_for_listing(listing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_listings_batches() {
        let (pool, first) = listing_fixture().await;
        let seller = insert_user(&pool, "other").await;
        let (cat, sub) = insert_taxonomy(&pool, "Electronics", "Audio").await;
        let second = insert_listing(&pool, seller, cat, sub, "Speaker", 500).await;
        let repo = SqlxListingImageRepository::new(pool);
        repo.insert(first, "a", true).await.unwrap();
        repo.insert(second, "b", false).await.unwrap();
        repo.insert(second, "c", true).await.unwrap();

        let images = repo.list_for_listings(&[first, second]).await.unwrap();
        assert_eq!(images.len(), 3);
        assert!(repo.list_for_listings(&[]).await.unwrap().is_empty());
        assert!(repo.set_primary(second, images[1].id, true).await.unwrap());
        assert!(!repo.set_primary(first, images[1].id, true).await.unwrap());
    }
}
