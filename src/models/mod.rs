//! Data models
//!
//! Database entities (users, sessions, categories, listings and their
//! images) plus the value types shared by services and handlers: prices,
//! search filters, pagination and form errors.

mod category;
mod form;
mod listing;
mod pagination;
mod session;
mod user;

pub use category::{taxonomy_slug, Category, SubCategory, SubCategoryMatch};
pub use form::{max_length, required, FormErrors, NON_FIELD};
pub use listing::{
    primary_image, Condition, Listing, ListingDraft, ListingFilter, ListingImage,
    ListingSearchParams, ListingStatus, ListingTitleMatch, Price, PriceError, SortKey, MAX_PRICE_CENTS,
};
pub use pagination::{offset_for, page_count, resolve_page, Paginated, PAGE_SIZE};
pub use session::Session;
pub use user::{NewUser, ProfileUpdate, User};
