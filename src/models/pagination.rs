//! Page-number pagination

use serde::Serialize;

/// Fixed page size for listing collections
pub const PAGE_SIZE: u32 = 12;

/// One page of a larger result set
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Current page number (1-indexed)
    pub number: u32,
    pub num_pages: u32,
    pub total: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, number: u32, total: i64, per_page: u32) -> Self {
        let num_pages = page_count(total, per_page);
        Self {
            items,
            number,
            num_pages,
            total,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// Number of pages, never less than one so an empty result still has a page.
pub fn page_count(total: i64, per_page: u32) -> u32 {
    let per_page = per_page.max(1) as i64;
    let pages = (total.max(0) + per_page - 1) / per_page;
    pages.max(1) as u32
}

/// Resolve a requested page number the forgiving way: a missing or
/// non-numeric value means page 1, while zero, negatives and numbers past
/// the end all mean the last page.
pub fn resolve_page(requested: Option<&str>, total: i64, per_page: u32) -> u32 {
    let last = page_count(total, per_page);
    match requested.and_then(|raw| raw.trim().parse::<i64>().ok()) {
        Some(n) if n < 1 => last,
        Some(n) if n > last as i64 => last,
        Some(n) => n as u32,
        None => 1,
    }
}

/// Row offset for a page number
pub fn offset_for(number: u32, per_page: u32) -> i64 {
    (number.saturating_sub(1) as i64) * per_page as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_page_count_has_at_least_one_page() {
        assert_eq!(page_count(0, 12), 1);
        assert_eq!(page_count(12, 12), 1);
        assert_eq!(page_count(13, 12), 2);
    }

    #[test]
    fn test_resolve_page_rules() {
        assert_eq!(resolve_page(None, 30, 12), 1);
        assert_eq!(resolve_page(Some("abc"), 30, 12), 1);
        assert_eq!(resolve_page(Some("2"), 30, 12), 2);
        assert_eq!(resolve_page(Some("99"), 30, 12), 3);
        assert_eq!(resolve_page(Some("0"), 30, 12), 3);
        assert_eq!(resolve_page(Some("-2"), 30, 12), 3);
        assert_eq!(resolve_page(Some(""), 30, 12), 1);
        assert_eq!(resolve_page(Some("-4"), 0, 12), 1);
    }

    #[test]
    fn test_paginated_flags() {
        let page = Paginated::new(vec![1, 2], 2, 26, 12);
        assert_eq!(page.num_pages, 3);
        assert!(page.has_next);
        assert!(page.has_previous);

        let last = Paginated::new(vec![1], 3, 26, 12).map(|n| n * 10);
        assert_eq!(last.items, vec![10]);
        assert!(!last.has_next);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn resolved_page_is_always_in_range(total in 0i64..10_000, requested in "-?[0-9]{0,6}") {
            let page = resolve_page(Some(&requested), total, PAGE_SIZE);
            prop_assert!(page >= 1);
            prop_assert!(page <= page_count(total, PAGE_SIZE));
        }
    }
}
