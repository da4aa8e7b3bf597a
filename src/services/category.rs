//! Category service
//!
//! Read paths go through the moka cache; the taxonomy only changes when
//! [`CategoryService::seed`] runs, which drops every cached entry.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::repositories::CategoryRepository;
use crate::models::{taxonomy_slug, Category, SubCategory};
use crate::services::taxonomy::TaxonomyEntry;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY_CATEGORY_LIST: &str = "categories:all";
const CACHE_KEY_SUBCATEGORIES: &str = "subcategories:";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Counts of records created by a seeding run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub categories_created: usize,
    pub subcategories_created: usize,
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        let cache_ttl = cache.ttl();
        Self { repo, cache, cache_ttl }
    }

    /// All categories ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST).await {
            return Ok(cached);
        }
        let categories = self.repo.list().await.context("Failed to list categories")?;
        let _ = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &categories, self.cache_ttl)
            .await;
        Ok(categories)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.list().await?.into_iter().find(|c| c.id == id))
    }

    /// Subcategories of a category ordered by name; empty for unknown ids
    pub async fn subcategories(&self, category_id: i64) -> Result<Vec<SubCategory>, CategoryServiceError> {
        let key = format!("{}{}", CACHE_KEY_SUBCATEGORIES, category_id);
        if let Ok(Some(cached)) = self.cache.get::<Vec<SubCategory>>(&key).await {
            return Ok(cached);
        }
        let subcategories = self
            .repo
            .list_subcategories(category_id)
            .await
            .context("Failed to list subcategories")?;
        let _ = self.cache.set(&key, &subcategories, self.cache_ttl).await;
        Ok(subcategories)
    }

    pub async fn get_subcategory(&self, id: i64) -> Result<Option<SubCategory>, CategoryServiceError> {
        Ok(self
            .repo
            .get_subcategory(id)
            .await
            .context("Failed to get subcategory")?)
    }

    /// Look up a category and one of its subcategories by exact names.
    pub async fn resolve_names(
        &self,
        category: &str,
        subcategory: &str,
    ) -> Result<(Category, SubCategory), CategoryServiceError> {
        let parent = self
            .repo
            .get_by_name(category.trim())
            .await
            .context("Failed to get category by name")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("category '{}'", category.trim())))?;
        let child = self
            .repo
            .get_subcategory_by_name(parent.id, subcategory.trim())
            .await
            .context("Failed to get subcategory by name")?
            .ok_or_else(|| {
                CategoryServiceError::NotFound(format!(
                    "subcategory '{}' in '{}'",
                    subcategory.trim(),
                    parent.name
                ))
            })?;
        Ok((parent, child))
    }

    /// Get-or-create every category and subcategory of `taxonomy`.
    ///
    /// Existing records are matched by name and left untouched, so running
    /// it twice creates nothing the second time.
    pub async fn seed(&self, taxonomy: &[TaxonomyEntry]) -> Result<SeedReport, CategoryServiceError> {
        let mut report = SeedReport::default();

        for entry in taxonomy {
            let category = match self
                .repo
                .get_by_name(entry.name)
                .await
                .context("Failed to get category by name")?
            {
                Some(existing) => existing,
                None => {
                    let created = self
                        .repo
                        .create(entry.name, &taxonomy_slug(entry.name), entry.icon)
                        .await
                        .context("Failed to create category")?;
                    tracing::info!("Created category: {}", created.name);
                    report.categories_created += 1;
                    created
                }
            };

            for (name, icon) in entry.subcategories {
                let exists = self
                    .repo
                    .get_subcategory_by_name(category.id, name)
                    .await
                    .context("Failed to get subcategory by name")?
                    .is_some();
                if exists {
                    continue;
                }
                self.repo
                    .create_subcategory(category.id, name, &taxonomy_slug(name), icon)
                    .await
                    .context("Failed to create subcategory")?;
                tracing::info!("  Created subcategory: {}", name);
                report.subcategories_created += 1;
            }
        }

        self.invalidate().await;
        Ok(report)
    }

    pub async fn invalidate(&self) {
        let _ = self.cache.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::services::taxonomy::TAXONOMY;

    async fn service() -> CategoryService {
        let pool = setup_pool().await;
        CategoryService::new(SqlxCategoryRepository::boxed(pool), Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let service = service().await;
        let first = service.seed(TAXONOMY).await.unwrap();
        assert_eq!(first.categories_created, 15);
        assert_eq!(first.subcategories_created, 150);

        let second = service.seed(TAXONOMY).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(service.list().await.unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_seed_invalidates_cached_list() {
        let service = service().await;
        assert!(service.list().await.unwrap().is_empty());

        service.seed(&TAXONOMY[..2]).await.unwrap();
        let names: Vec<String> = service.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Electronics".to_string(), "Vehicles".to_string()]);
    }

    #[tokio::test]
    async fn test_subcategories_and_resolve_names() {
        let service = service().await;
        service.seed(&TAXONOMY[..1]).await.unwrap();
        let electronics = service.list().await.unwrap().remove(0);

        let subs = service.subcategories(electronics.id).await.unwrap();
        assert_eq!(subs.len(), 10);
        assert_eq!(subs[0].name, "Accessories");
        assert!(service.subcategories(9999).await.unwrap().is_empty());

        let (category, sub) = service.resolve_names(" Electronics ", "Laptops").await.unwrap();
        assert_eq!(category.id, electronics.id);
        assert_eq!(sub.slug, "laptops");

        assert!(matches!(
            service.resolve_names("Electronics", "Boats").await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }
}
