//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, the account token flows, image storage and the moka-backed
//! taxonomy cache.

pub mod account;
pub mod category;
pub mod email;
pub mod images;
pub mod import;
pub mod listing;
pub mod password;
pub mod rate_limiter;
pub mod suggestions;
pub mod taxonomy;
pub mod tokens;
pub mod user;

pub use account::{AccountService, AccountServiceError};
pub use category::{CategoryService, CategoryServiceError, SeedReport};
pub use email::{mailer_from_config, EmailService, LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use images::{image_store_from_config, ImageStore, ImageUpload, ImageVariant};
pub use import::{read_rows, ImportReport, ImportRow, ListingImporter};
pub use listing::{ImageChanges, ListingCard, ListingForm, ListingService, ListingServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use suggestions::{Suggestion, SuggestionService};
pub use taxonomy::TAXONOMY;
pub use tokens::TokenGenerator;
pub use user::{LoginInput, SignupInput, UserService, UserServiceError};
