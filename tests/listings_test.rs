//! Listing pages, authoring and the JSON endpoints over HTTP

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use common::{location, TestApp};
use serde_json::Value;

// Smallest valid PNG: 1x1 transparent pixel
const PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

fn listing_form(title: &str, price: &str, category: i64, subcategory: i64) -> MultipartForm {
    MultipartForm::new()
        .add_text("title", title.to_string())
        .add_text("description", "Barely used, all original parts.")
        .add_text("price", price.to_string())
        .add_text("category", category.to_string())
        .add_text("subcategory", subcategory.to_string())
        .add_text("condition", "used")
        .add_text("location", "Addis Ababa")
        .add_text("contact_telegram", "@seller")
}

fn ajax_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    )
}

/// Post a listing and return its id
async fn create_listing(app: &TestApp, title: &str, price: &str) -> i64 {
    let (category, subcategory) = app.taxonomy_ids().await;
    let form = listing_form(title, price, category, subcategory).add_part(
        "image",
        Part::bytes(PNG.to_vec()).file_name("photo.png").mime_type("image/png"),
    );
    let response = app.server.post("/create-listing/").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER, "{}", response.text());

    let target = location(&response);
    target
        .trim_start_matches("/listing/")
        .trim_end_matches('/')
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_home_and_static_pages_render() {
    let app = TestApp::new().await;
    let home = app.server.get("/").await;
    home.assert_status_ok();
    assert!(home.text().contains("Recent listings"));

    app.server.get("/privacy-policy/").await.assert_status_ok();
    app.server.get("/terms-of-service/").await.assert_status_ok();
    app.server.get("/static/js/site.js").await.assert_status_ok();
}

#[tokio::test]
async fn test_unknown_pages_render_themed_404() {
    let app = TestApp::new().await;
    let response = app.server.get("/no-such-page/").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(response.text().contains("Page not found"));

    let response = app.server.get("/listing/999/").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_listing_and_view_detail() {
    let app = TestApp::new().await;
    app.signup("tigist").await;
    let id = create_listing(&app, "Mountain bike", "1500.50").await;

    let detail = app.server.get(&format!("/listing/{}/", id)).await;
    detail.assert_status_ok();
    let html = detail.text();
    assert!(html.contains("Mountain bike"));
    assert!(html.contains("1,500.50"));
    assert!(html.contains("Listing created successfully!"));
    assert!(html.contains("/media/"));

    let listing = app.state.listing_service.detail(id).await.unwrap().listing;
    // One view from the page, one from this lookup
    assert_eq!(listing.view_count, 2);
}

#[tokio::test]
async fn test_invalid_listing_form_is_rerendered() {
    let app = TestApp::new().await;
    app.signup("meron").await;
    let (category, subcategory) = app.taxonomy_ids().await;

    let form = listing_form("Desk", "12.345", category, subcategory);
    let response = app.server.post("/create-listing/").multipart(form).await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("errorlist"));
    assert!(html.contains("value=\"Desk\""));
}

#[tokio::test]
async fn test_only_the_owner_can_edit() {
    let app = TestApp::new().await;
    app.signup("owner").await;
    let id = create_listing(&app, "Guitar", "300").await;
    app.logout().await;

    app.signup("stranger").await;
    let response = app.server.get(&format!("/listing/{}/edit/", id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app
        .server
        .post(&format!("/listing/{}/status/sold/", id))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_transitions_redirect_to_dashboard() {
    let app = TestApp::new().await;
    app.signup("kebede").await;
    let id = create_listing(&app, "Sofa", "800").await;

    let response = app.server.post(&format!("/listing/{}/status/SOLD/", id)).await;
    assert_eq!(location(&response), "/my-listings/");
    let dashboard = app.server.get("/my-listings/").await.text();
    // the message names the normalised status, not the raw path segment
    assert!(dashboard.contains("Listing status updated to &#x27;sold&#x27;."), "{}", dashboard);
    assert!(!dashboard.contains("SOLD"));

    let response = app.server.post(&format!("/listing/{}/status/archived/", id)).await;
    assert_eq!(location(&response), "/my-listings/");
    let dashboard = app.server.get("/my-listings/").await.text();
    assert!(dashboard.contains("Invalid status selected."));

    // Sold listings leave the catalogue
    let filtered: Value = app.server.get("/api/filter-listings/").await.json();
    assert_eq!(filtered["total_count"], 0);
}

#[tokio::test]
async fn test_filter_listings_endpoint() {
    let app = TestApp::new().await;
    app.signup("ruth").await;
    create_listing(&app, "Road bike", "900").await;
    create_listing(&app, "Kids bike", "120").await;
    create_listing(&app, "Blender", "45").await;

    let response = app.server.get("/api/filter-listings/?search=bike&sort_by=price_low").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total_count"], 2);
    assert_eq!(body["has_next"], false);
    let html = body["listings_html"].as_str().unwrap();
    let kids = html.find("Kids bike").unwrap();
    let road = html.find("Road bike").unwrap();
    assert!(kids < road);

    // Malformed filters are ignored
    let body: Value = app.server.get("/api/filter-listings/?min_price=abc").await.json();
    assert_eq!(body["total_count"], 3);
}

#[tokio::test]
async fn test_subcategories_endpoint() {
    let app = TestApp::new().await;
    let (category, subcategory) = app.taxonomy_ids().await;

    let body: Value = app
        .server
        .get(&format!("/api/subcategories/?category_id={}", category))
        .await
        .json();
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[0]["id"], subcategory);
    assert!(items[0]["icon"].is_string());

    let body: Value = app.server.get("/api/subcategories/?category_id=x").await.json();
    assert_eq!(body, Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_search_suggestions_require_ajax() {
    let app = TestApp::new().await;

    let response = app.server.get("/search-suggestions/?q=ele").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Invalid request");

    let (name, value) = ajax_header();
    let response = app
        .server
        .get("/search-suggestions/?q=ele")
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let suggestions = response.json::<Value>()["suggestions"].as_array().unwrap().clone();
    assert!(!suggestions.is_empty());
    assert!(suggestions.len() <= 8);
    assert_eq!(suggestions[0]["type"], "category");

    let (name, value) = ajax_header();
    let short: Value = app
        .server
        .get("/search-suggestions/?q=e")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(short["suggestions"], Value::Array(Vec::new()));
}
