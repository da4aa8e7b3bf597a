//! Listing model
//!
//! Listings, their images, and the search parameters used to narrow the
//! public catalogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::form::FormErrors;

/// Largest representable price: ten digits, two of them decimals.
pub const MAX_PRICE_CENTS: i64 = 99_999_999_99;

/// Fixed-point price stored as integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("Enter a number.")]
    NotANumber,
    #[error("Ensure that there are no more than 2 decimal places.")]
    TooManyDecimals,
    #[error("Ensure this value is greater than or equal to 0.")]
    Negative,
    #[error("Ensure that there are no more than 10 digits in total.")]
    TooLarge,
}

impl Price {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('-') {
            return match rest.parse::<Price>() {
                Ok(p) if p.0 == 0 => Ok(p),
                Ok(_) => Err(PriceError::Negative),
                Err(e) => Err(e),
            };
        }
        let s = s.strip_prefix('+').unwrap_or(s);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if (whole.is_empty() && frac.is_empty())
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PriceError::NotANumber);
        }
        if frac.len() > 2 {
            return Err(PriceError::TooManyDecimals);
        }
        let whole = whole.trim_start_matches('0');
        if whole.len() > 8 {
            return Err(PriceError::TooLarge);
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| PriceError::NotANumber)?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| PriceError::NotANumber)? * 10,
            _ => frac.parse().map_err(|_| PriceError::NotANumber)?,
        };
        let cents = whole * 100 + frac;
        if cents > MAX_PRICE_CENTS {
            return Err(PriceError::TooLarge);
        }
        Ok(Price(cents))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }
        // shortest round-trip form, so 12.345 keeps its third decimal
        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Item condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::New, Condition::Used];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Used => "used",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Condition::New => "New",
            Condition::Used => "Used",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Condition::New),
            "used" => Ok(Condition::Used),
            _ => Err(anyhow::anyhow!("Invalid condition: {}", s)),
        }
    }
}

/// Listing lifecycle state. "Removed" hides a listing without deleting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Available,
    Sold,
    Removed,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Sold => "sold",
            ListingStatus::Removed => "removed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ListingStatus::Available => "Available",
            ListingStatus::Sold => "Sold",
            ListingStatus::Removed => "Removed",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = anyhow::Error;

    /// Case-insensitive, so `/status/SOLD/` is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(ListingStatus::Available),
            "sold" => Ok(ListingStatus::Sold),
            "removed" => Ok(ListingStatus::Removed),
            _ => Err(anyhow::anyhow!("Invalid listing status: {}", s)),
        }
    }
}

/// An item offered for sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: Price,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub condition: Condition,
    pub location: String,
    pub contact_telegram: String,
    pub status: ListingStatus,
    pub view_count: i64,
    pub seller_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_available(&self) -> bool {
        self.status == ListingStatus::Available
    }
}

/// Validated listing fields, used for both insert and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: Price,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub condition: Condition,
    pub location: String,
    pub contact_telegram: String,
}

/// Image attached to a listing; `image_ref` is the storage identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingImage {
    pub id: i64,
    pub listing_id: i64,
    pub image_ref: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// The image shown for a listing: the flagged one, else the first.
pub fn primary_image(images: &[ListingImage]) -> Option<&ListingImage> {
    images
        .iter()
        .filter(|img| img.is_primary)
        .min_by_key(|img| img.id)
        .or_else(|| images.iter().min_by_key(|img| img.id))
}

/// Listing title hit used by search suggestions
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListingTitleMatch {
    pub listing_id: i64,
    pub title: String,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub category_name: String,
}

/// Catalogue sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    PriceLow,
    PriceHigh,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::Newest,
        SortKey::Oldest,
        SortKey::PriceLow,
        SortKey::PriceHigh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
            SortKey::PriceLow => "price_low",
            SortKey::PriceHigh => "price_high",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Newest => "Newest First",
            SortKey::Oldest => "Oldest First",
            SortKey::PriceLow => "Price: Low to High",
            SortKey::PriceHigh => "Price: High to Low",
        }
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "newest" => Ok(SortKey::Newest),
            "oldest" => Ok(SortKey::Oldest),
            "price_low" => Ok(SortKey::PriceLow),
            "price_high" => Ok(SortKey::PriceHigh),
            other => Err(anyhow::anyhow!("Invalid sort key: {}", other)),
        }
    }
}

/// Conjunctive filter over available listings. `None` fields are no-ops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    /// Case-insensitive substring of title or description
    pub search: Option<String>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub condition: Option<Condition>,
    /// Case-insensitive exact location
    pub location: Option<String>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub sort: SortKey,
}

/// Raw query-string parameters of the search form.
///
/// Everything arrives as text so a malformed value becomes a form error
/// instead of rejecting the whole request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSearchParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub condition: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListingSearchParams {
    /// Build the filter; malformed fields are reported and left out.
    pub fn to_filter(&self) -> (ListingFilter, FormErrors) {
        let mut errors = FormErrors::new();
        let mut filter = ListingFilter {
            search: non_blank(&self.search).map(str::to_string),
            location: non_blank(&self.location).map(str::to_string),
            ..ListingFilter::default()
        };

        if let Some(raw) = non_blank(&self.category) {
            match raw.parse::<i64>() {
                Ok(id) => filter.category_id = Some(id),
                Err(_) => errors.add("category", "Select a valid choice."),
            }
        }
        if let Some(raw) = non_blank(&self.subcategory) {
            match raw.parse::<i64>() {
                Ok(id) => filter.subcategory_id = Some(id),
                Err(_) => errors.add("subcategory", "Select a valid choice."),
            }
        }
        if let Some(raw) = non_blank(&self.condition) {
            match raw.parse::<Condition>() {
                Ok(c) => filter.condition = Some(c),
                Err(_) => errors.add("condition", "Select a valid choice."),
            }
        }
        if let Some(raw) = non_blank(&self.min_price) {
            match raw.parse::<Price>() {
                Ok(p) => filter.min_price = Some(p),
                Err(e) => errors.add("min_price", e.to_string()),
            }
        }
        if let Some(raw) = non_blank(&self.max_price) {
            match raw.parse::<Price>() {
                Ok(p) => filter.max_price = Some(p),
                Err(e) => errors.add("max_price", e.to_string()),
            }
        }
        if let Some(raw) = non_blank(&self.sort_by) {
            match raw.parse::<SortKey>() {
                Ok(s) => filter.sort = s,
                Err(_) => errors.add("sort_by", "Select a valid choice."),
            }
        }

        (filter, errors)
    }

    /// Query string of the active parameters without `page`, for pager links.
    pub fn query_without_page(&self) -> String {
        let pairs = [
            ("search", &self.search),
            ("category", &self.category),
            ("subcategory", &self.subcategory),
            ("condition", &self.condition),
            ("location", &self.location),
            ("min_price", &self.min_price),
            ("max_price", &self.max_price),
            ("sort_by", &self.sort_by),
        ];
        pairs
            .iter()
            .filter_map(|(key, value)| {
                non_blank(value).map(|v| format!("{}={}", key, urlencoding::encode(v)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}
