//! Page/per_page handling shared by every list endpoint

use serde::{Deserialize, Serialize};

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;
/// Highest page whose offset still fits in an `i64`
const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

/// Raw `page` / `per_page` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    /// Resolve with the default page size of 20
    pub fn resolve(self) -> Page {
        self.resolve_with_default(DEFAULT_PER_PAGE)
    }

    /// Resolve with a caller-provided default page size; values are clamped to 1..=100
    pub fn resolve_with_default(self, default_per_page: i64) -> Page {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1).min(MAX_PAGE);
        let per_page = self
            .per_page
            .filter(|p| *p > 0)
            .unwrap_or(default_per_page)
            .min(MAX_PER_PAGE);
        Page { page, per_page }
    }
}

/// A validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total + self.per_page - 1) / self.per_page
    }

    /// Standard `{ items, total, page, per_page, total_pages }` envelope
    pub fn envelope<T: Serialize>(&self, items: T, total: i64) -> serde_json::Value {
        serde_json::json!({
            "items": items,
            "total": total,
            "page": self.page,
            "per_page": self.per_page,
            "total_pages": self.total_pages(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_twenty() {
        let page = Pagination::default().resolve();
        assert_eq!(page, Page { page: 1, per_page: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn offset_skips_previous_pages() {
        let page = Pagination { page: Some(3), per_page: Some(25) }.resolve();
        assert_eq!(page.offset(), 50);
        assert_eq!(page.limit(), 25);
    }

    #[test]
    fn per_page_is_capped_at_one_hundred() {
        let page = Pagination { page: Some(1), per_page: Some(500) }.resolve();
        assert_eq!(page.per_page, 100);
    }

    #[test]
    fn non_positive_values_fall_back() {
        let page = Pagination { page: Some(0), per_page: Some(-4) }.resolve_with_default(50);
        assert_eq!(page, Page { page: 1, per_page: 50 });
    }

    #[test]
    fn huge_page_numbers_stay_in_range() {
        let page = Pagination { page: Some(i64::MAX), per_page: None }.resolve();
        assert_eq!(page.page, MAX_PAGE);
        assert!(page.offset() > 0);

        let widest = Pagination { page: Some(i64::MAX), per_page: Some(100) }.resolve();
        assert_eq!(widest.offset(), (MAX_PAGE - 1) * 100);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page { page: 1, per_page: 20 };
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(20), 1);
        assert_eq!(page.total_pages(21), 2);
    }

    #[test]
    fn envelope_carries_counts() {
        let page = Page { page: 2, per_page: 10 };
        let body = page.envelope(vec![1, 2, 3], 13);
        assert_eq!(body["total"], 13);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["items"].as_array().map(Vec::len), Some(3));
    }
}
