//! Database repositories
//!
//! Each repository wraps one table group behind a trait so services can be
//! tested against the same SQL that production runs.

pub mod category;
pub mod listing;
pub mod listing_image;
pub mod session;
pub mod user;

#[cfg(test)]
pub mod test_support;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use listing::{ListingRepository, SqlArg, SqlxListingRepository};
pub use listing_image::{ListingImageRepository, SqlxListingImageRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Search key stored next to searchable text.
///
/// SQLite's `LOWER()` only folds ASCII, so the `*_folded` columns are
/// written from Rust and compared against patterns folded the same way.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Substring pattern over a `*_folded` column, for `LIKE ? ESCAPE '!'`.
///
/// The LIKE wildcards are escaped so user text always matches literally.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in fold_case(query).chars() {
        if matches!(ch, '!' | '%' | '_') {
            pattern.push('!');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::{fold_case, like_pattern};

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Phone"), "%phone%");
        assert_eq!(like_pattern("50%_off!"), "%50!%!_off!!%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_fold_case_handles_non_ascii() {
        assert_eq!(fold_case("Éclair ТЕЛЕФОН Öl"), "éclair телефон öl");
        assert_eq!(like_pattern("ÉCLAIR"), "%éclair%");
    }
}
