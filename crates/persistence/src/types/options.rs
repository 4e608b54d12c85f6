//! Find and create options.
//!
//! [`FindOptions`] collects pagination, sorting and eager-loading choices for
//! a read. Builders are chainable and never fail; conflicting calls are
//! resolved by the rules documented on each method.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(QueryError::InvalidSortOrder {
                value: s.to_string(),
            }),
        }
    }
}

/// A single sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column to sort by.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortSpec {
    /// Creates a sort directive.
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

impl FromStr for SortSpec {
    type Err = QueryError;

    /// Parses `"field"` or `"field asc|desc"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field = parts.next().unwrap_or_default();
        let order = match parts.next() {
            Some(direction) => direction.parse()?,
            None => SortOrder::Asc,
        };
        if field.is_empty() || parts.next().is_some() {
            return Err(QueryError::InvalidSortOrder {
                value: s.to_string(),
            });
        }
        Ok(SortSpec::new(field, order))
    }
}

/// Parses a comma-separated ORDER BY list such as `"name asc, created_at desc"`.
pub fn parse_sort_list(order: &str) -> Result<Vec<SortSpec>, QueryError> {
    order
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::parse)
        .collect()
}

/// Options for read operations.
///
/// ```
/// use stencil_persistence::types::{FindOptions, SortOrder};
///
/// let options = FindOptions::new()
///     .with_pagination(2, 20)
///     .with_sort_desc("created_at")
///     .with_order_by("name", SortOrder::Asc)
///     .with_preloads(["keys"]);
///
/// assert!(options.is_pagination_set());
/// assert_eq!(options.sort.len(), 2);
/// assert!(options.is_preload_set());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    /// 1-based page number; `0` means unset.
    pub page: u32,
    /// Items per page; `0` means unset.
    pub page_size: u32,
    /// Sort directives, applied in order.
    pub sort: Vec<SortSpec>,
    /// Relation paths to eager-load. Dotted paths load nested relations.
    pub preloads: BTreeSet<String>,
}

impl FindOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets page and page size. Later calls overwrite earlier ones.
    pub fn with_pagination(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Appends a sort directive.
    pub fn with_order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortSpec::new(field, order));
        self
    }

    /// Appends an ascending sort.
    pub fn with_sort_asc(self, field: impl Into<String>) -> Self {
        self.with_order_by(field, SortOrder::Asc)
    }

    /// Appends a descending sort.
    pub fn with_sort_desc(self, field: impl Into<String>) -> Self {
        self.with_order_by(field, SortOrder::Desc)
    }

    /// Adds relation paths to eager-load. Duplicates collapse.
    pub fn with_preloads<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preloads.extend(
            paths
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty()),
        );
        self
    }

    /// True when both page and page size are positive.
    pub fn is_pagination_set(&self) -> bool {
        self.page > 0 && self.page_size > 0
    }

    /// True when at least one sort directive names a column.
    pub fn is_sort_set(&self) -> bool {
        self.sort.iter().any(|s| !s.field.is_empty())
    }

    /// True when at least one preload path is set.
    pub fn is_preload_set(&self) -> bool {
        !self.preloads.is_empty()
    }

    /// Number of rows to skip for the configured page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// What to do when an insert collides with an existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictAction {
    /// Keep the existing row.
    DoNothing,
    /// Overwrite every non-key column with the incoming values.
    UpdateAll,
    /// Overwrite only the listed columns.
    UpdateColumns(Vec<String>),
}

/// Upsert clause for inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnConflict {
    /// Conflict target columns. Empty means the primary key.
    pub target: Vec<String>,
    /// Resolution.
    pub action: ConflictAction,
}

impl OnConflict {
    /// Ignore rows that collide on `target`.
    pub fn do_nothing<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoNothing,
        }
    }

    /// Replace colliding rows on `target` with the incoming values.
    pub fn update_all<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::UpdateAll,
        }
    }
}

/// Options for insert operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Upsert behaviour; `None` means a collision is an error.
    pub on_conflict: Option<OnConflict>,
}

impl CreateOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upsert clause.
    pub fn with_on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options() {
        let options = FindOptions::new();
        assert!(!options.is_pagination_set());
        assert!(!options.is_sort_set());
        assert!(!options.is_preload_set());
    }

    #[test]
    fn test_pagination_requires_both_positive() {
        assert!(!FindOptions::new().with_pagination(1, 0).is_pagination_set());
        assert!(!FindOptions::new().with_pagination(0, 10).is_pagination_set());
        assert!(FindOptions::new().with_pagination(1, 10).is_pagination_set());
    }

    #[test]
    fn test_pagination_last_call_wins() {
        let options = FindOptions::new()
            .with_pagination(1, 10)
            .with_pagination(3, 25);
        assert_eq!((options.page, options.page_size), (3, 25));
        assert_eq!(options.offset(), 50);
    }

    #[test]
    fn test_sorts_append_in_call_order() {
        let options = FindOptions::new()
            .with_sort_asc("name")
            .with_sort_desc("created_at");
        assert_eq!(
            options.sort,
            vec![
                SortSpec::new("name", SortOrder::Asc),
                SortSpec::new("created_at", SortOrder::Desc)
            ]
        );
    }

    #[test]
    fn test_sort_with_empty_field_is_not_set() {
        let options = FindOptions::new().with_sort_asc("");
        assert!(!options.is_sort_set());
    }

    #[test]
    fn test_preloads_accumulate_as_set() {
        let options = FindOptions::new()
            .with_preloads(["keys", "account"])
            .with_preloads(vec!["keys".to_string(), String::new()]);
        assert_eq!(options.preloads.len(), 2);
        assert!(options.preloads.contains("account"));
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!(matches!(
            "sideways".parse::<SortOrder>(),
            Err(QueryError::InvalidSortOrder { .. })
        ));
    }

    #[test]
    fn test_parse_sort_list() {
        let specs = parse_sort_list("name asc, created_at DESC,id").unwrap();
        assert_eq!(
            specs,
            vec![
                SortSpec::new("name", SortOrder::Asc),
                SortSpec::new("created_at", SortOrder::Desc),
                SortSpec::new("id", SortOrder::Asc)
            ]
        );
        assert!(parse_sort_list("").unwrap().is_empty());
        assert!(parse_sort_list("name upward").is_err());
        assert!(parse_sort_list("name asc extra").is_err());
    }

    #[test]
    fn test_create_options() {
        let options = CreateOptions::new().with_on_conflict(OnConflict::do_nothing(["email"]));
        let conflict = options.on_conflict.unwrap();
        assert_eq!(conflict.target, vec!["email".to_string()]);
        assert_eq!(conflict.action, ConflictAction::DoNothing);
    }
}
