//! Listing pages
//!
//! - GET  /listings/                         - filtered catalogue
//! - GET  /listing/{id}/                     - detail (counts a view)
//! - GET/POST /create-listing/               - new listing (login)
//! - GET/POST /listing/{id}/edit/            - edit (owner)
//! - GET  /my-listings/                      - seller dashboard
//! - POST /listing/{id}/status/{status}/     - status transition (owner)

use axum::{
    extract::{Multipart, Path, Query, State},
    response::Response,
};
use serde::Serialize;
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{redirect_with, render_page, FlashMessage, PageChrome, PageError};
use crate::models::{Condition, FormErrors, ListingSearchParams, ListingStatus, SortKey};
use crate::services::images::ImageUpload;
use crate::services::listing::{ImageChanges, ImageView, ListingForm, ListingServiceError};

#[derive(Debug, Serialize)]
struct Choice {
    value: &'static str,
    label: &'static str,
}

fn condition_choices() -> Vec<Choice> {
    Condition::ALL
        .iter()
        .map(|c| Choice { value: c.as_str(), label: c.label() })
        .collect()
}

fn sort_choices() -> Vec<Choice> {
    SortKey::ALL
        .iter()
        .map(|s| Choice { value: s.as_str(), label: s.label() })
        .collect()
}

/// Categories plus the subcategories of the selected one, for the cascading selects
async fn insert_taxonomy(
    state: &AppState,
    context: &mut TeraContext,
    selected_category: Option<i64>,
) -> Result<(), PageError> {
    context.insert("categories", &state.category_service.list().await?);
    let subcategories = match selected_category {
        Some(id) => state.category_service.subcategories(id).await?,
        None => Vec::new(),
    };
    context.insert("subcategories", &subcategories);
    Ok(())
}

/// GET /listings/
pub async fn list_listings(
    State(state): State<AppState>,
    chrome: PageChrome,
    Query(params): Query<ListingSearchParams>,
) -> Result<Response, PageError> {
    let results = state.listing_service.search(&params).await?;
    let (filter, _) = params.to_filter();

    let mut context = TeraContext::new();
    context.insert("page", &results.page);
    context.insert("listings", &results.page.items);
    context.insert("form_errors", &results.errors);
    context.insert("params", &params);
    context.insert("query", &params.query_without_page());
    context.insert("conditions", &condition_choices());
    context.insert("sort_options", &sort_choices());
    insert_taxonomy(&state, &mut context, filter.category_id).await?;

    Ok(render_page(&state, chrome, "listings.html", context))
}

/// GET /listing/{id}/
pub async fn listing_detail(
    State(state): State<AppState>,
    chrome: PageChrome,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let detail = state.listing_service.detail(id).await?;
    let is_owner = chrome.user.as_ref().is_some_and(|u| u.id == detail.listing.seller_id);

    let mut context = TeraContext::new();
    context.insert("detail", &detail);
    context.insert("is_owner", &is_owner);
    Ok(render_page(&state, chrome, "listing_detail.html", context))
}

/// Everything the create/edit template needs
async fn render_form(
    state: &AppState,
    chrome: PageChrome,
    form: &ListingForm,
    errors: &FormErrors,
    editing: Option<(i64, Vec<ImageView>)>,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("form_errors", errors);
    context.insert("conditions", &condition_choices());
    context.insert("is_create", &editing.is_none());
    match editing {
        Some((listing_id, images)) => {
            context.insert("listing_id", &listing_id);
            context.insert("images", &images);
        }
        None => context.insert("images", &Vec::<ImageView>::new()),
    }
    insert_taxonomy(state, &mut context, form.category.trim().parse().ok()).await?;
    Ok(render_page(state, chrome, "listing_form.html", context))
}

/// Split a multipart listing form into text fields and image changes.
///
/// File inputs left empty arrive as parts with no filename and no bytes;
/// those are skipped.
pub async fn read_listing_multipart(mut multipart: Multipart) -> Result<(ListingForm, ImageChanges), PageError> {
    let mut form = ListingForm::default();
    let mut changes = ImageChanges::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PageError::BadRequest(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| PageError::BadRequest(format!("Failed to read upload: {}", e)))?;
            if filename.is_empty() && bytes.is_empty() {
                continue;
            }
            changes.uploads.push(ImageUpload {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| PageError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;
        match name.as_str() {
            "title" => form.title = value,
            "description" => form.description = value,
            "price" => form.price = value,
            "category" => form.category = value,
            "subcategory" => form.subcategory = value,
            "condition" => form.condition = value,
            "location" => form.location = value,
            "contact_telegram" => form.contact_telegram = value,
            "new_primary" => changes.new_primary.extend(value.trim().parse::<usize>().ok()),
            "existing_primary" => changes.existing_primary.extend(value.trim().parse::<i64>().ok()),
            "delete_image" => changes.delete_image.extend(value.trim().parse::<i64>().ok()),
            other => tracing::debug!("Ignoring unknown listing form field: {}", other),
        }
    }

    Ok((form, changes))
}

/// GET /create-listing/
pub async fn create_listing_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let form = ListingForm::for_seller(&user);
    render_form(&state, chrome, &form, &FormErrors::new(), None).await
}

/// POST /create-listing/
pub async fn create_listing(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let (form, changes) = read_listing_multipart(multipart).await?;
    match state.listing_service.create(&user, &form, changes).await {
        Ok(listing) => Ok(redirect_with(
            &format!("/listing/{}/", listing.id),
            &[FlashMessage::success("Listing created successfully!")],
            &[],
        )),
        Err(ListingServiceError::Validation(errors)) => render_form(&state, chrome, &form, &errors, None).await,
        Err(e) => Err(e.into()),
    }
}

/// GET /listing/{id}/edit/
pub async fn edit_listing_page(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let (listing, images) = state.listing_service.owned(user.id, id).await?;
    let form = ListingForm::from_listing(&listing);
    render_form(&state, chrome, &form, &FormErrors::new(), Some((listing.id, images))).await
}

/// POST /listing/{id}/edit/
pub async fn edit_listing(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    // Ownership before reading the body
    state.listing_service.owned(user.id, id).await?;
    let (form, changes) = read_listing_multipart(multipart).await?;

    match state.listing_service.update(&user, id, &form, changes).await {
        Ok(listing) => Ok(redirect_with(
            &format!("/listing/{}/", listing.id),
            &[FlashMessage::success("Listing updated successfully!")],
            &[],
        )),
        Err(ListingServiceError::Validation(errors)) => {
            let (_, images) = state.listing_service.owned(user.id, id).await?;
            render_form(&state, chrome, &form, &errors, Some((id, images))).await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /my-listings/
pub async fn my_listings(
    State(state): State<AppState>,
    chrome: PageChrome,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let listings = state.listing_service.my_listings(user.id).await?;
    let statuses: Vec<Choice> = [ListingStatus::Available, ListingStatus::Sold, ListingStatus::Removed]
        .iter()
        .map(|s| Choice { value: s.as_str(), label: s.label() })
        .collect();

    let mut context = TeraContext::new();
    context.insert("listings", &listings);
    context.insert("statuses", &statuses);
    Ok(render_page(&state, chrome, "my_listings.html", context))
}

/// POST /listing/{id}/status/{status}/
pub async fn set_listing_status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, status)): Path<(i64, String)>,
) -> Result<Response, PageError> {
    let message = match state.listing_service.set_status(user.id, id, &status).await {
        Ok(applied) => FlashMessage::success(format!("Listing status updated to '{}'.", applied.as_str())),
        Err(ListingServiceError::InvalidStatus(_)) => FlashMessage::error("Invalid status selected."),
        Err(e) => return Err(e.into()),
    };
    Ok(redirect_with("/my-listings/", &[message], &[]))
}
