//! Bulk listing import from JSON or YAML files

use crate::db::repositories::{ListingImageRepository, ListingRepository, UserRepository};
use crate::models::{Condition, ListingDraft, Price};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::images::{content_type_for_path, ImageStore, ImageUpload};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of an import file, typed only once the row itself is imported
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    pub category: String,
    pub subcategory: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact_telegram: String,
    pub seller_email: String,
    /// Comma-separated image paths, relative to the import file
    #[serde(default)]
    pub images: String,
}

fn default_condition() -> String {
    "used".to_string()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

enum RowOutcome {
    Imported(i64),
    Skipped(String),
}

/// Read the row list from `path`; `.yaml`/`.yml` are YAML, anything else JSON.
///
/// Only the outer list is checked here. Each entry stays untyped so one
/// malformed row cannot reject the rest of the file.
pub fn read_rows(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse YAML in {:?}", path))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {:?}", path))
    }
}

fn row_label(raw: &Value) -> &str {
    raw.get("title").and_then(Value::as_str).unwrap_or("untitled")
}

/// Image file read from disk, waiting to be stored
struct PendingImage {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

pub struct ListingImporter {
    users: Arc<dyn UserRepository>,
    categories: Arc<CategoryService>,
    listings: Arc<dyn ListingRepository>,
    images: Arc<dyn ListingImageRepository>,
    store: Arc<dyn ImageStore>,
    base_dir: PathBuf,
}

impl ListingImporter {
    pub fn new(
        users: Arc<dyn UserRepository>,
        categories: Arc<CategoryService>,
        listings: Arc<dyn ListingRepository>,
        images: Arc<dyn ListingImageRepository>,
        store: Arc<dyn ImageStore>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            users,
            categories,
            listings,
            images,
            store,
            base_dir: base_dir.into(),
        }
    }

    /// Import every row. A failing row is logged and counted as skipped.
    pub async fn import(&self, rows: &[Value]) -> ImportReport {
        let mut report = ImportReport::default();
        for (index, raw) in rows.iter().enumerate() {
            let label = row_label(raw);
            match self.import_row(raw).await {
                Ok(RowOutcome::Imported(id)) => {
                    tracing::info!(listing_id = id, "Imported row {}: {}", index + 1, label);
                    report.imported += 1;
                }
                Ok(RowOutcome::Skipped(reason)) => {
                    tracing::warn!("Skipping row {} ({}): {}", index + 1, label, reason);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Error importing row {} ({}): {:#}", index + 1, label, e);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    async fn import_row(&self, raw: &Value) -> Result<RowOutcome> {
        let row = match ImportRow::deserialize(raw) {
            Ok(row) => row,
            Err(e) => return Ok(RowOutcome::Skipped(format!("invalid row: {}", e))),
        };

        let Some(seller) = self
            .users
            .get_by_email(&row.seller_email.trim().to_lowercase())
            .await
            .context("Failed to get seller")?
        else {
            return Ok(RowOutcome::Skipped(format!("seller {} not found", row.seller_email)));
        };

        let (category, subcategory) = match self.categories.resolve_names(&row.category, &row.subcategory).await {
            Ok(pair) => pair,
            Err(CategoryServiceError::NotFound(what)) => {
                return Ok(RowOutcome::Skipped(format!("{} not found", what)));
            }
            Err(e) => return Err(e.into()),
        };

        let condition: Condition = row.condition.parse()?;
        let title = row.title.trim();
        if title.is_empty() {
            bail!("title is empty");
        }

        // nothing is written until every image is readable and stored
        let pending = self.read_images(&row.images).await?;
        let mut image_refs = Vec::with_capacity(pending.len());
        for image in pending {
            let image_ref = self
                .store
                .upload(ImageUpload {
                    filename: image.filename,
                    content_type: image.content_type,
                    bytes: image.bytes,
                })
                .await?;
            image_refs.push(image_ref);
        }

        let draft = ListingDraft {
            title: title.to_string(),
            description: row.description.trim().to_string(),
            price: row.price,
            category_id: category.id,
            subcategory_id: subcategory.id,
            condition,
            location: row.location.trim().to_string(),
            contact_telegram: row.contact_telegram.trim().to_string(),
        };
        let listing = self
            .listings
            .create(seller.id, &draft)
            .await
            .context("Failed to create listing")?;

        for (index, image_ref) in image_refs.iter().enumerate() {
            if let Err(e) = self.images.insert(listing.id, image_ref, index == 0).await {
                tracing::warn!(listing_id = listing.id, "Failed to attach image {}: {:#}", image_ref, e);
            }
        }

        Ok(RowOutcome::Imported(listing.id))
    }

    async fn read_images(&self, images: &str) -> Result<Vec<PendingImage>> {
        let mut pending = Vec::new();
        for relative in images.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let path = self.base_dir.join(relative);
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read image {:?}", path))?;
            pending.push(PendingImage {
                filename: relative.to_string(),
                content_type: content_type_for_path(&path).to_string(),
                bytes,
            });
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::test_support::{insert_taxonomy, insert_user, setup_pool};
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxListingImageRepository, SqlxListingRepository, SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::services::images::LocalImageStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(title: &str, seller: &str, subcategory: &str, images: &str) -> Value {
        json!({
            "title": title,
            "description": "Imported",
            "price": "25.00",
            "category": "Home & Garden",
            "subcategory": subcategory,
            "condition": "new",
            "location": "Bahir Dar",
            "contact_telegram": "@shop",
            "seller_email": seller,
            "images": images,
        })
    }

    struct Fixture {
        pool: DynDatabasePool,
        dir: TempDir,
        listings: Arc<dyn ListingRepository>,
        images: Arc<dyn ListingImageRepository>,
        importer: ListingImporter,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lamp.png"), [0x89, b'P', b'N', b'G']).unwrap();
        insert_user(&pool, "shop").await;
        insert_taxonomy(&pool, "Home & Garden", "Lighting").await;

        let listings = SqlxListingRepository::boxed(pool.clone());
        let images = SqlxListingImageRepository::boxed(pool.clone());
        let importer = ListingImporter::new(
            SqlxUserRepository::boxed(pool.clone()),
            Arc::new(CategoryService::new(
                SqlxCategoryRepository::boxed(pool.clone()),
                Arc::new(MemoryCache::new()),
            )),
            listings.clone(),
            images.clone(),
            Arc::new(LocalImageStore::new(&dir.path().join("media"), "listings")),
            dir.path(),
        );
        Fixture { pool, dir, listings, images, importer }
    }

    async fn seller_titles(fx: &Fixture) -> Vec<String> {
        let seller = SqlxUserRepository::new(fx.pool.clone())
            .get_by_email("shop@example.com")
            .await
            .unwrap()
            .unwrap();
        let mut titles: Vec<String> = fx
            .listings
            .list_by_seller(seller.id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_import_skips_unresolvable_rows() {
        let fx = fixture().await;
        let rows = vec![
            row("Desk lamp", "SHOP@example.com", "Lighting", "lamp.png, lamp.png"),
            row("Ghost", "nobody@example.com", "Lighting", ""),
            row("Sofa", "shop@example.com", "Furniture", ""),
            row("Broken", "shop@example.com", "Lighting", "missing.png"),
        ];
        let report = fx.importer.import(&rows).await;
        assert_eq!(report, ImportReport { imported: 1, skipped: 3 });

        // the row with an unreadable image left nothing behind
        assert_eq!(seller_titles(&fx).await, vec!["Desk lamp"]);

        let seller = SqlxUserRepository::new(fx.pool.clone())
            .get_by_email("shop@example.com")
            .await
            .unwrap()
            .unwrap();
        let mine = fx.listings.list_by_seller(seller.id).await.unwrap();
        let stored = fx.images.list_for_listing(mine[0].id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].is_primary);
        assert!(!stored[1].is_primary);
    }

    #[tokio::test]
    async fn test_malformed_rows_do_not_sink_the_file() {
        let fx = fixture().await;
        let path = fx.dir.path().join("rows.json");
        std::fs::write(
            &path,
            r#"[
                {"title":"Floor lamp","price":"30","category":"Home & Garden","subcategory":"Lighting","seller_email":"shop@example.com"},
                {"title":"Negative","price":"-4","category":"Home & Garden","subcategory":"Lighting","seller_email":"shop@example.com"},
                {"title":"Too precise","price":12.345,"category":"Home & Garden","subcategory":"Lighting","seller_email":"shop@example.com"},
                {"title":"No seller","price":"5","category":"Home & Garden","subcategory":"Lighting"},
                "not an object",
                {"title":"Wall lamp","price":18.5,"category":"Home & Garden","subcategory":"Lighting","seller_email":"shop@example.com"}
            ]"#,
        )
        .unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 6);
        let report = fx.importer.import(&rows).await;
        assert_eq!(report, ImportReport { imported: 2, skipped: 4 });
        assert_eq!(seller_titles(&fx).await, vec!["Floor lamp", "Wall lamp"]);
    }

    #[test]
    fn test_read_rows_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("rows.json");
        std::fs::write(
            &json,
            r#"[{"title":"Kettle","price":"12.50","category":"Home & Garden","subcategory":"Kitchen","seller_email":"a@b.c"}]"#,
        )
        .unwrap();
        let rows = read_rows(&json).unwrap();
        let kettle = ImportRow::deserialize(&rows[0]).unwrap();
        assert_eq!(kettle.price.cents(), 1250);
        assert_eq!(kettle.condition, "used");

        let yaml = dir.path().join("rows.yml");
        std::fs::write(
            &yaml,
            "- title: Chair\n  price: 40\n  category: Home & Garden\n  subcategory: Furniture\n  seller_email: a@b.c\n  images: chair.jpg\n",
        )
        .unwrap();
        let rows = read_rows(&yaml).unwrap();
        let chair = ImportRow::deserialize(&rows[0]).unwrap();
        assert_eq!(chair.price.cents(), 4000);
        assert_eq!(chair.images, "chair.jpg");
        assert_eq!(row_label(&rows[0]), "Chair");

        let not_a_list = dir.path().join("rows.json5");
        std::fs::write(&not_a_list, r#"{"title":"Kettle"}"#).unwrap();
        assert!(read_rows(&not_a_list).is_err());
    }
}
