//! Value types shared by the repository and the paginator.
//!
//! - [`FindOptions`], [`SortOrder`] - pagination, sort and preload choices
//! - [`CreateOptions`], [`OnConflict`] - insert behaviour
//! - [`Page`], [`PageTotals`] - paged read results
//!
//! # Example
//!
//! ```
//! use stencil_persistence::types::{calculate_page_count, FindOptions, Page};
//!
//! let options = FindOptions::new().with_pagination(1, 10).with_sort_asc("name");
//! assert!(options.is_sort_set());
//!
//! assert_eq!(calculate_page_count(25, 10), 3);
//!
//! let page: Page<String> = Page::empty(1, 10);
//! assert!(page.data.is_empty());
//! ```

mod options;
mod pagination;

pub use options::{
    ConflictAction, CreateOptions, FindOptions, OnConflict, SortOrder, SortSpec, parse_sort_list,
};
pub use pagination::{
    DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, Page, PageTotals, calculate_page_count,
};
