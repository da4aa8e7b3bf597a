//! Category and subcategory models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level listing category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Icon identifier (font icon name, e.g. `laptop`)
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

/// Second-level category, unique by slug within its parent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubCategory {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub slug: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

/// Subcategory together with its parent's name, as returned by name searches
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubCategoryMatch {
    pub subcategory: SubCategory,
    pub category_name: String,
}

/// Slug rule used for the built-in taxonomy: lowercase, spaces to `-`, `&` to `and`.
pub fn taxonomy_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-").replace('&', "and")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_slug() {
        assert_eq!(taxonomy_slug("Electronics"), "electronics");
        assert_eq!(taxonomy_slug("Home & Garden"), "home-and-garden");
        assert_eq!(taxonomy_slug("Audio & Headphones"), "audio-and-headphones");
        assert_eq!(taxonomy_slug("E-books"), "e-books");
    }
}
