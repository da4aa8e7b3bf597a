//! Static assets and locally stored images

use axum::{
    http::{header, HeaderValue},
    Router,
};
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

/// Directory holding stylesheets and scripts, relative to the working directory
pub const STATIC_DIR: &str = "static";

/// `/static/*` from [`STATIC_DIR`] and `/media/*` from the local image store.
pub fn asset_router<S: Clone + Send + Sync + 'static>(upload_dir: &Path) -> Router<S> {
    let static_files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        ))
        .service(ServeDir::new(STATIC_DIR));

    // Stored image names are unique, so they never change
    let media_files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        ))
        .service(ServeDir::new(upload_dir));

    Router::new()
        .nest_service("/static", static_files)
        .nest_service("/media", media_files)
}
