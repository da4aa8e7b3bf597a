//! Search-as-you-type suggestions
//!
//! Categories, subcategories and available listing titles matching a short
//! query, flattened into one de-duplicated list.

use crate::db::repositories::{CategoryRepository, ListingRepository};
use anyhow::Context;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_SUGGESTIONS: usize = 8;
const CATEGORY_LIMIT: i64 = 4;
const SUBCATEGORY_LIMIT: i64 = 5;
const LISTING_LIMIT: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Category,
    Subcategory,
    Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub type_display: String,
    pub url: String,
    pub category_id: i64,
    pub subcategory_id: Option<i64>,
}

pub struct SuggestionService {
    categories: Arc<dyn CategoryRepository>,
    listings: Arc<dyn ListingRepository>,
}

impl SuggestionService {
    pub fn new(categories: Arc<dyn CategoryRepository>, listings: Arc<dyn ListingRepository>) -> Self {
        Self { categories, listings }
    }

    /// Up to [`MAX_SUGGESTIONS`] hits: categories, then subcategories, then products.
    pub async fn suggest(&self, query: &str) -> anyhow::Result<Vec<Suggestion>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();

        for category in self
            .categories
            .search(query, CATEGORY_LIMIT)
            .await
            .context("Failed to search categories")?
        {
            found.push(Suggestion {
                url: format!("/listings/?category={}", category.id),
                name: category.name,
                kind: SuggestionKind::Category,
                type_display: "Category".to_string(),
                category_id: category.id,
                subcategory_id: None,
            });
        }

        for hit in self
            .categories
            .search_subcategories(query, SUBCATEGORY_LIMIT)
            .await
            .context("Failed to search subcategories")?
        {
            let sub = hit.subcategory;
            found.push(Suggestion {
                url: subcategory_url(sub.category_id, sub.id),
                name: sub.name,
                kind: SuggestionKind::Subcategory,
                type_display: format!("in {}", hit.category_name),
                category_id: sub.category_id,
                subcategory_id: Some(sub.id),
            });
        }

        for hit in self
            .listings
            .search_titles(query, LISTING_LIMIT)
            .await
            .context("Failed to search listing titles")?
        {
            found.push(Suggestion {
                url: subcategory_url(hit.category_id, hit.subcategory_id),
                name: hit.title,
                kind: SuggestionKind::Product,
                type_display: format!("Product in {}", hit.category_name),
                category_id: hit.category_id,
                subcategory_id: Some(hit.subcategory_id),
            });
        }

        Ok(dedupe(found))
    }
}

fn subcategory_url(category_id: i64, subcategory_id: i64) -> String {
    format!("/listings/?category={}&subcategory={}", category_id, subcategory_id)
}

/// Keep the first suggestion per URL, in order, capped at [`MAX_SUGGESTIONS`].
fn dedupe(found: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|s| seen.insert(s.url.clone()))
        .take(MAX_SUGGESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_listing, insert_taxonomy, insert_user, setup_pool};
    use crate::db::repositories::{SqlxCategoryRepository, SqlxListingRepository};
    use proptest::prelude::*;

    fn suggestion(url: &str) -> Suggestion {
        Suggestion {
            name: url.to_string(),
            kind: SuggestionKind::Product,
            type_display: String::new(),
            url: url.to_string(),
            category_id: 1,
            subcategory_id: None,
        }
    }

    #[tokio::test]
    async fn test_short_query_is_empty() {
        let pool = setup_pool().await;
        let service = SuggestionService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxListingRepository::boxed(pool),
        );
        assert!(service.suggest(" p ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sources_are_ordered_and_deduplicated() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "nahom").await;
        let (cat, phones) = insert_taxonomy(&pool, "Phones & Tablets", "Phone Cases").await;
        insert_listing(&pool, seller, cat, phones, "Phone case, leather", 300).await;
        let (other, laptops) = insert_taxonomy(&pool, "Computers", "Laptops").await;
        insert_listing(&pool, seller, other, laptops, "Laptop with phone charger", 900).await;

        let service = SuggestionService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxListingRepository::boxed(pool),
        );
        let hits = service.suggest("PHONE").await.unwrap();
        let kinds: Vec<SuggestionKind> = hits.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SuggestionKind::Category, SuggestionKind::Subcategory, SuggestionKind::Product]
        );
        assert_eq!(hits[0].url, format!("/listings/?category={}", cat));
        assert_eq!(hits[1].type_display, "in Phones & Tablets");
        assert_eq!(hits[2].name, "Laptop with phone charger");
        assert_eq!(hits[2].type_display, "Product in Computers");
    }

    #[test]
    fn test_suggestion_serializes_type_field() {
        let json = serde_json::to_value(suggestion("/listings/?category=1")).unwrap();
        assert_eq!(json["type"], "product");
        assert!(json["subcategory_id"].is_null());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn dedupe_keeps_unique_urls_within_cap(urls in prop::collection::vec("[a-d]", 0..20)) {
            let out = dedupe(urls.iter().map(|u| suggestion(u)).collect());
            prop_assert!(out.len() <= MAX_SUGGESTIONS);
            let unique: HashSet<&str> = out.iter().map(|s| s.url.as_str()).collect();
            prop_assert_eq!(unique.len(), out.len());
            let mut expected: Vec<&str> = Vec::new();
            for u in &urls {
                if !expected.contains(&u.as_str()) {
                    expected.push(u);
                }
            }
            let got: Vec<&str> = out.iter().map(|s| s.url.as_str()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
