//! Paged read results.

use serde::{Deserialize, Serialize};

use super::options::SortOrder;

/// Column used when a paged read specifies no sort.
pub const DEFAULT_SORT_FIELD: &str = "created_at";

/// Direction used when a paged read specifies no sort.
pub const DEFAULT_SORT_ORDER: SortOrder = SortOrder::Desc;

/// One page of a filtered, sorted read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The requested 1-based page number (0 when unpaginated).
    pub page: u32,

    /// The requested page size (0 when unpaginated).
    pub page_size: u32,

    /// Number of pages the filtered set spans.
    pub page_count: u64,

    /// Total rows matching the filter, independent of pagination.
    pub record_count: u64,

    /// Rows on this page.
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Creates an empty page for the requested position.
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            page_count: 0,
            record_count: 0,
            data: Vec::new(),
        }
    }

    /// Returns true if there is a page after this one.
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.page_count
    }

    /// Maps the items while keeping the totals.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            page: self.page,
            page_size: self.page_size,
            page_count: self.page_count,
            record_count: self.record_count,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

/// Totals computed without fetching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageTotals {
    /// Number of pages the filtered set spans.
    pub page_count: u64,
    /// Total rows matching the filter.
    pub record_count: u64,
}

impl PageTotals {
    /// Computes totals for a record count at the given page size.
    pub fn new(record_count: u64, page_size: u32) -> Self {
        Self {
            page_count: calculate_page_count(record_count, page_size),
            record_count,
        }
    }
}

/// Number of pages needed to hold `record_count` rows.
///
/// An unpaginated read (`page_size == 0`) reports one page per record.
pub fn calculate_page_count(record_count: u64, page_size: u32) -> u64 {
    let page_size = u64::from(page_size);
    if record_count == 0 {
        0
    } else if record_count <= page_size {
        1
    } else if page_size == 0 {
        record_count
    } else {
        record_count.div_ceil(page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_rule() {
        assert_eq!(calculate_page_count(0, 10), 0);
        assert_eq!(calculate_page_count(0, 0), 0);
        assert_eq!(calculate_page_count(10, 10), 1);
        assert_eq!(calculate_page_count(3, 10), 1);
        assert_eq!(calculate_page_count(11, 10), 2);
        assert_eq!(calculate_page_count(25, 10), 3);
        assert_eq!(calculate_page_count(7, 0), 7);
    }

    #[test]
    fn test_page_totals() {
        let totals = PageTotals::new(25, 10);
        assert_eq!(totals.page_count, 3);
        assert_eq!(totals.record_count, 25);
    }

    #[test]
    fn test_has_next() {
        let mut page: Page<i32> = Page::empty(2, 10);
        page.page_count = 3;
        assert!(page.has_next());
        page.page = 3;
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_serializes_snake_case() {
        let page = Page {
            page: 1,
            page_size: 2,
            page_count: 1,
            record_count: 1,
            data: vec!["a"],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["page_size"], 2);
        assert_eq!(json["record_count"], 1);
        assert_eq!(json["data"][0], "a");
    }
}
