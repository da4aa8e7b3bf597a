//! JSON endpoints behind the listing filters and the search box
//!
//! - GET /api/subcategories/?category_id=
//! - GET /api/filter-listings/?...
//! - GET /search-suggestions/?q=

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::middleware::{is_ajax, ApiError, AppState};
use crate::models::ListingSearchParams;

#[derive(Debug, Deserialize)]
pub struct SubcategoryQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubcategoryOption {
    pub id: i64,
    pub name: String,
    pub icon: String,
}

/// GET /api/subcategories/
///
/// A missing or malformed id yields an empty list.
pub async fn subcategories(
    State(state): State<AppState>,
    Query(query): Query<SubcategoryQuery>,
) -> Result<Json<Vec<SubcategoryOption>>, ApiError> {
    let Some(category_id) = query.category_id.and_then(|raw| raw.trim().parse::<i64>().ok()) else {
        return Ok(Json(Vec::new()));
    };
    let subcategories = state
        .category_service
        .subcategories(category_id)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(
        subcategories
            .into_iter()
            .map(|s| SubcategoryOption { id: s.id, name: s.name, icon: s.icon })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct FilteredListings {
    pub listings_html: String,
    pub has_next: bool,
    pub has_previous: bool,
    pub total_count: i64,
}

/// GET /api/filter-listings/
///
/// Same filters as the list page, answered with the rendered result cards.
pub async fn filter_listings(
    State(state): State<AppState>,
    Query(params): Query<ListingSearchParams>,
) -> Result<Json<FilteredListings>, ApiError> {
    let results = state
        .listing_service
        .search(&params)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    let mut context = TeraContext::new();
    context.insert("listings", &results.page.items);
    let listings_html = state
        .theme
        .render("partials/listing_cards.html", &context)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(FilteredListings {
        listings_html,
        has_next: results.page.has_next,
        has_previous: results.page.has_previous,
        total_count: results.page.total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /search-suggestions/
pub async fn search_suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SuggestionQuery>,
) -> Response {
    if !is_ajax(&headers) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid request" }))).into_response();
    }

    match state.suggestion_service.suggest(&query.q).await {
        Ok(suggestions) => Json(json!({ "suggestions": suggestions })).into_response(),
        Err(e) => ApiError::internal_error(format!("Failed to load suggestions: {:#}", e)).into_response(),
    }
}
