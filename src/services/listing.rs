//! Listing service
//!
//! Catalogue search, detail pages, seller authoring with image changes and
//! status transitions. Every page that shows listings goes through
//! [`ListingService::search`] or one of the card builders here so image URLs
//! are resolved the same way everywhere.

use crate::config::ImageConfig;
use crate::db::repositories::{ListingImageRepository, ListingRepository, UserRepository};
use crate::models::{
    max_length, offset_for, primary_image, required, resolve_page, Category, Condition, FormErrors,
    Listing, ListingDraft, ListingFilter, ListingImage, ListingSearchParams, ListingStatus, Paginated,
    Price, SubCategory, User, PAGE_SIZE,
};
use crate::services::category::CategoryService;
use crate::services::images::{validate_upload, ImageStore, ImageUpload, ImageVariant};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const RECENT_LIMIT: i64 = 8;
const FEATURED_LIMIT: usize = 3;
const RELATED_LIMIT: i64 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ListingServiceError {
    #[error("Listing not found: {0}")]
    NotFound(i64),

    #[error("Invalid status selected.")]
    InvalidStatus(String),

    #[error("Invalid input: {0}")]
    Validation(FormErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A listing plus the URL of its display image
#[derive(Debug, Clone, Serialize)]
pub struct ListingCard {
    #[serde(flatten)]
    pub listing: Listing,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub id: i64,
    pub is_primary: bool,
    pub url: String,
    pub thumbnail_url: String,
    pub original_url: String,
}

/// Public contact details of a seller
#[derive(Debug, Clone, Serialize)]
pub struct SellerView {
    pub username: String,
    pub telegram_username: String,
    pub phone: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingDetail {
    pub listing: Listing,
    pub images: Vec<ImageView>,
    pub primary_image: Option<ImageView>,
    pub category: Option<Category>,
    pub subcategory: Option<SubCategory>,
    pub seller: Option<SellerView>,
    pub related: Vec<ListingCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeListings {
    pub recent: Vec<ListingCard>,
    pub featured: Vec<ListingCard>,
}

/// Outcome of a catalogue search: the page plus any rejected parameters
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub page: Paginated<ListingCard>,
    pub errors: FormErrors,
}

/// The listing form as submitted. Values stay text until validated so the
/// form can be re-rendered exactly as typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingForm {
    pub title: String,
    pub description: String,
    pub price: String,
    pub category: String,
    pub subcategory: String,
    pub condition: String,
    pub location: String,
    pub contact_telegram: String,
}

impl ListingForm {
    pub fn from_listing(listing: &Listing) -> Self {
        Self {
            title: listing.title.clone(),
            description: listing.description.clone(),
            price: listing.price.to_string(),
            category: listing.category_id.to_string(),
            subcategory: listing.subcategory_id.to_string(),
            condition: listing.condition.as_str().to_string(),
            location: listing.location.clone(),
            contact_telegram: listing.contact_telegram.clone(),
        }
    }

    /// Empty form prefilled from the seller's profile
    pub fn for_seller(seller: &User) -> Self {
        Self {
            location: seller.location.clone(),
            contact_telegram: seller.telegram_username.clone(),
            ..Self::default()
        }
    }
}

/// Image edits submitted with a listing form
#[derive(Debug, Clone, Default)]
pub struct ImageChanges {
    pub uploads: Vec<ImageUpload>,
    /// Indices into `uploads` to flag as primary
    pub new_primary: Vec<usize>,
    /// Kept image ids that stay or become primary; every other kept image is cleared
    pub existing_primary: Vec<i64>,
    pub delete_image: Vec<i64>,
}

pub struct ListingService {
    listings: Arc<dyn ListingRepository>,
    images: Arc<dyn ListingImageRepository>,
    users: Arc<dyn UserRepository>,
    categories: Arc<CategoryService>,
    store: Arc<dyn ImageStore>,
    image_config: ImageConfig,
}

impl ListingService {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        images: Arc<dyn ListingImageRepository>,
        users: Arc<dyn UserRepository>,
        categories: Arc<CategoryService>,
        store: Arc<dyn ImageStore>,
        image_config: ImageConfig,
    ) -> Self {
        Self {
            listings,
            images,
            users,
            categories,
            store,
            image_config,
        }
    }

    /// One page of available listings matching the search parameters.
    pub async fn search(&self, params: &ListingSearchParams) -> Result<SearchResults, ListingServiceError> {
        let (filter, errors) = params.to_filter();
        if !errors.is_empty() {
            tracing::debug!("Ignoring malformed search parameters: {}", errors);
        }
        let page = self.page(&filter, params.page.as_deref()).await?;
        Ok(SearchResults { page, errors })
    }

    pub async fn page(
        &self,
        filter: &ListingFilter,
        requested: Option<&str>,
    ) -> Result<Paginated<ListingCard>, ListingServiceError> {
        let total = self.listings.count(filter).await.context("Failed to count listings")?;
        let number = resolve_page(requested, total, PAGE_SIZE);
        let rows = self
            .listings
            .search(filter, offset_for(number, PAGE_SIZE), PAGE_SIZE as i64)
            .await
            .context("Failed to search listings")?;
        let cards = self.cards(rows).await?;
        Ok(Paginated::new(cards, number, total, PAGE_SIZE))
    }

    /// Newest available listings for the home page
    pub async fn home(&self) -> Result<HomeListings, ListingServiceError> {
        let rows = self
            .listings
            .search(&ListingFilter::default(), 0, RECENT_LIMIT)
            .await
            .context("Failed to list recent listings")?;
        let recent = self.cards(rows).await?;
        let featured = recent.iter().take(FEATURED_LIMIT).cloned().collect();
        Ok(HomeListings { recent, featured })
    }

    /// Detail view of any listing; counts the view.
    pub async fn detail(&self, id: i64) -> Result<ListingDetail, ListingServiceError> {
        if !self
            .listings
            .increment_view_count(id)
            .await
            .context("Failed to increment view count")?
        {
            return Err(ListingServiceError::NotFound(id));
        }
        let listing = self.get(id).await?;

        let images = self.image_views(&listing).await?;
        let primary = primary_image_view(&images);
        let category = self.categories.get(listing.category_id).await.map_err(anyhow::Error::from)?;
        let subcategory = self
            .categories
            .get_subcategory(listing.subcategory_id)
            .await
            .map_err(anyhow::Error::from)?;
        let seller = self
            .users
            .get_by_id(listing.seller_id)
            .await
            .context("Failed to get seller")?
            .map(|u| SellerView {
                username: u.username,
                telegram_username: u.telegram_username,
                phone: u.phone,
                location: u.location,
            });
        let related_rows = self
            .listings
            .related(listing.category_id, listing.id, RELATED_LIMIT)
            .await
            .context("Failed to list related listings")?;
        let related = self.cards(related_rows).await?;

        Ok(ListingDetail {
            listing,
            primary_image: primary,
            images,
            category,
            subcategory,
            seller,
            related,
        })
    }

    /// Every listing of a seller, any status, newest first
    pub async fn my_listings(&self, seller_id: i64) -> Result<Vec<ListingCard>, ListingServiceError> {
        let rows = self
            .listings
            .list_by_seller(seller_id)
            .await
            .context("Failed to list seller listings")?;
        self.cards(rows).await
    }

    /// A listing the seller may edit, with its images. Other sellers get `NotFound`.
    pub async fn owned(&self, seller_id: i64, id: i64) -> Result<(Listing, Vec<ImageView>), ListingServiceError> {
        let listing = self.get(id).await?;
        if listing.seller_id != seller_id {
            return Err(ListingServiceError::NotFound(id));
        }
        let images = self.image_views(&listing).await?;
        Ok((listing, images))
    }

    /// Validate the form fields and uploads.
    pub async fn validate(&self, form: &ListingForm, changes: &ImageChanges) -> Result<ListingDraft, ListingServiceError> {
        let mut errors = FormErrors::new();

        let title = required(&mut errors, "title", &form.title);
        max_length(&mut errors, "title", title, 200);
        let description = required(&mut errors, "description", &form.description);
        let location = required(&mut errors, "location", &form.location);
        max_length(&mut errors, "location", location, 200);
        let contact = required(&mut errors, "contact_telegram", &form.contact_telegram);
        max_length(&mut errors, "contact_telegram", contact, 100);

        let price = match required(&mut errors, "price", &form.price) {
            "" => None,
            raw => match raw.parse::<Price>() {
                Ok(p) => Some(p),
                Err(e) => {
                    errors.add("price", e.to_string());
                    None
                }
            },
        };

        let condition = match required(&mut errors, "condition", &form.condition) {
            "" => None,
            raw => match raw.parse::<Condition>() {
                Ok(c) => Some(c),
                Err(_) => {
                    errors.add("condition", "Select a valid choice.");
                    None
                }
            },
        };

        let category_id = self.check_category(&mut errors, &form.category).await?;
        let subcategory_id = match category_id {
            Some(category_id) => self.check_subcategory(&mut errors, category_id, &form.subcategory).await?,
            None => {
                required(&mut errors, "subcategory", &form.subcategory);
                None
            }
        };

        for upload in &changes.uploads {
            if let Err(e) = validate_upload(&self.image_config, upload) {
                errors.add("images", format!("{}: {}", upload.filename, e));
            }
        }

        match (price, condition, category_id, subcategory_id) {
            (Some(price), Some(condition), Some(category_id), Some(subcategory_id)) if errors.is_empty() => {
                Ok(ListingDraft {
                    title: title.to_string(),
                    description: description.to_string(),
                    price,
                    category_id,
                    subcategory_id,
                    condition,
                    location: location.to_string(),
                    contact_telegram: contact.to_string(),
                })
            }
            _ => Err(ListingServiceError::Validation(errors)),
        }
    }

    pub async fn create(
        &self,
        seller: &User,
        form: &ListingForm,
        changes: ImageChanges,
    ) -> Result<Listing, ListingServiceError> {
        let draft = self.validate(form, &changes).await?;
        let listing = self
            .listings
            .create(seller.id, &draft)
            .await
            .context("Failed to create listing")?;
        tracing::info!(listing_id = listing.id, seller_id = seller.id, "Created listing");

        self.apply_image_changes(listing.id, changes).await?;
        Ok(listing)
    }

    pub async fn update(
        &self,
        seller: &User,
        id: i64,
        form: &ListingForm,
        changes: ImageChanges,
    ) -> Result<Listing, ListingServiceError> {
        let (listing, _) = self.owned(seller.id, id).await?;
        let draft = self.validate(form, &changes).await?;
        self.listings
            .update(listing.id, &draft)
            .await
            .context("Failed to update listing")?;

        self.apply_image_changes(listing.id, changes).await?;
        self.get(listing.id).await
    }

    /// Change the status of one of the seller's listings.
    ///
    /// The status name is matched case-insensitively.
    pub async fn set_status(&self, seller_id: i64, id: i64, raw: &str) -> Result<ListingStatus, ListingServiceError> {
        let (listing, _) = self.owned(seller_id, id).await?;
        let status = raw
            .parse::<ListingStatus>()
            .map_err(|_| ListingServiceError::InvalidStatus(raw.to_string()))?;
        self.listings
            .set_status(listing.id, status)
            .await
            .context("Failed to set listing status")?;
        tracing::info!(listing_id = listing.id, status = status.as_str(), "Listing status changed");
        Ok(status)
    }

    /// Deletions first, then primary flags of kept images, then uploads, and
    /// finally the single-primary repair.
    async fn apply_image_changes(&self, listing_id: i64, changes: ImageChanges) -> Result<(), ListingServiceError> {
        let deleted: HashSet<i64> = changes.delete_image.iter().copied().collect();
        for image_id in &deleted {
            if let Some(image) = self
                .images
                .delete(listing_id, *image_id)
                .await
                .context("Failed to delete listing image")?
            {
                if let Err(e) = self.store.delete(&image.image_ref).await {
                    tracing::warn!(image_id = image.id, "Failed to delete stored image: {}", e);
                }
            }
        }

        let keep_primary: HashSet<i64> = changes.existing_primary.iter().copied().collect();
        let kept = self
            .images
            .list_for_listing(listing_id)
            .await
            .context("Failed to list listing images")?;
        for image in kept {
            let wanted = keep_primary.contains(&image.id);
            if image.is_primary != wanted {
                self.images
                    .set_primary(listing_id, image.id, wanted)
                    .await
                    .context("Failed to update primary flag")?;
            }
        }

        let new_primary: HashSet<usize> = changes.new_primary.iter().copied().collect();
        for (index, upload) in changes.uploads.into_iter().enumerate() {
            let image_ref = self.store.upload(upload).await.context("Failed to upload image")?;
            self.images
                .insert(listing_id, &image_ref, new_primary.contains(&index))
                .await
                .context("Failed to insert listing image")?;
        }

        let cleared = self
            .images
            .enforce_single_primary(listing_id)
            .await
            .context("Failed to repair primary images")?;
        if cleared > 0 {
            tracing::debug!(listing_id, cleared, "Cleared extra primary images");
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Listing, ListingServiceError> {
        self.listings
            .get_by_id(id)
            .await
            .context("Failed to get listing")?
            .ok_or(ListingServiceError::NotFound(id))
    }

    async fn check_category(&self, errors: &mut FormErrors, raw: &str) -> Result<Option<i64>, ListingServiceError> {
        let raw = required(errors, "category", raw);
        if raw.is_empty() {
            return Ok(None);
        }
        let Ok(id) = raw.parse::<i64>() else {
            errors.add("category", "Select a valid choice.");
            return Ok(None);
        };
        let exists = self.categories.get(id).await.map_err(anyhow::Error::from)?.is_some();
        if !exists {
            errors.add("category", "Select a valid choice. That choice is not one of the available choices.");
            return Ok(None);
        }
        Ok(Some(id))
    }

    async fn check_subcategory(
        &self,
        errors: &mut FormErrors,
        category_id: i64,
        raw: &str,
    ) -> Result<Option<i64>, ListingServiceError> {
        let raw = required(errors, "subcategory", raw);
        if raw.is_empty() {
            return Ok(None);
        }
        let belongs = match raw.parse::<i64>() {
            Ok(id) => self
                .categories
                .subcategories(category_id)
                .await
                .map_err(anyhow::Error::from)?
                .iter()
                .any(|s| s.id == id)
                .then_some(id),
            Err(_) => None,
        };
        if belongs.is_none() {
            errors.add("subcategory", "Select a valid choice. That choice is not one of the available choices.");
        }
        Ok(belongs)
    }

    async fn image_views(&self, listing: &Listing) -> Result<Vec<ImageView>, ListingServiceError> {
        let images = self
            .images
            .list_for_listing(listing.id)
            .await
            .context("Failed to list listing images")?;
        Ok(images.iter().map(|img| self.image_view(img)).collect())
    }

    fn image_view(&self, image: &ListingImage) -> ImageView {
        ImageView {
            id: image.id,
            is_primary: image.is_primary,
            url: self.store.url(&image.image_ref, ImageVariant::Medium),
            thumbnail_url: self.store.url(&image.image_ref, ImageVariant::Thumbnail),
            original_url: self.store.url(&image.image_ref, ImageVariant::Original),
        }
    }

    /// Attach thumbnail URLs with one image query for the whole batch.
    async fn cards(&self, listings: Vec<Listing>) -> Result<Vec<ListingCard>, ListingServiceError> {
        let ids: Vec<i64> = listings.iter().map(|l| l.id).collect();
        let images = self
            .images
            .list_for_listings(&ids)
            .await
            .context("Failed to list listing images")?;

        let mut by_listing: HashMap<i64, Vec<ListingImage>> = HashMap::new();
        for image in images {
            by_listing.entry(image.listing_id).or_default().push(image);
        }

        Ok(listings
            .into_iter()
            .map(|listing| {
                let image_url = by_listing
                    .get(&listing.id)
                    .and_then(|imgs| primary_image(imgs))
                    .map(|img| self.store.url(&img.image_ref, ImageVariant::Thumbnail));
                ListingCard { listing, image_url }
            })
            .collect())
    }
}

fn primary_image_view(images: &[ImageView]) -> Option<ImageView> {
    images
        .iter()
        .find(|img| img.is_primary)
        .or_else(|| images.first())
        .cloned()
}
