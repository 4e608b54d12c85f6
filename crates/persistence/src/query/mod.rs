//! Predicates and the query builder.
//!
//! A [`Query`] is an immutable, parameterized filter condition: a SQL-like
//! fragment with `?` placeholders and one [`QueryArg`] per placeholder. The
//! builder functions turn a `(field, operator, value)` triple into a
//! predicate without the caller writing fragments by hand, and the
//! combinators merge predicates while preserving precedence.
//!
//! # Example
//!
//! ```
//! use stencil_persistence::query::{self, Query};
//!
//! let filter = query::and([
//!     query::eq("account_id", "acc-1"),
//!     query::eq("deleted_at", None::<String>),
//!     query::eq("id", vec!["k1", "k2"]),
//! ]);
//!
//! assert_eq!(
//!     filter.fragment(),
//!     "(account_id = ? AND deleted_at IS NULL AND id IN (?))"
//! );
//! assert_eq!(filter.args().len(), 2);
//!
//! // Building from optional criteria never needs a special case.
//! let name: Option<&str> = None;
//! let filter = query::and([
//!     name.map(|n| query::eq("name", n)).unwrap_or_default(),
//!     query::eq("active", true),
//! ]);
//! assert_eq!(filter.fragment(), "active = ?");
//! ```
//!
//! Operators passed to [`build_query_with_operator`] are not validated; an
//! operator the backend cannot compile fails when the statement executes.

mod value;

use std::fmt;

pub use value::{IntoQueryValue, QueryArg, QueryValue, SqlValue};

/// An immutable filter condition with positional arguments.
///
/// The empty query (empty fragment, no arguments) means "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fragment: String,
    args: Vec<QueryArg>,
}

impl Query {
    /// Creates a predicate from a fragment and its arguments.
    pub fn new(fragment: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self {
            fragment: fragment.into(),
            args,
        }
    }

    /// Creates a predicate from a raw fragment with no arguments.
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self::new(fragment, Vec::new())
    }

    /// The condition text.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// The positional arguments, in placeholder order.
    pub fn args(&self) -> &[QueryArg] {
        &self.args
    }

    /// Splits the predicate into fragment and arguments.
    pub fn into_parts(self) -> (String, Vec<QueryArg>) {
        (self.fragment, self.args)
    }

    /// Returns true if this predicate filters nothing.
    pub fn is_empty(&self) -> bool {
        self.fragment.trim().is_empty()
    }

    /// Counts `?` placeholders in the fragment.
    ///
    /// A `?` inside a quoted literal or identifier is text, not a
    /// placeholder.
    pub fn placeholder_count(&self) -> usize {
        split_placeholders(&self.fragment).len() - 1
    }

    /// Combines with another predicate using AND.
    pub fn and(self, other: Query) -> Query {
        and([self, other])
    }

    /// Combines with another predicate using OR.
    pub fn or(self, other: Query) -> Query {
        or([self, other])
    }

    /// Adds an equality condition with AND.
    pub fn eq(self, field: &str, value: impl IntoQueryValue) -> Query {
        self.and(eq(field, value))
    }

    /// Adds a `>=` condition with AND.
    pub fn gte(self, field: &str, value: impl IntoQueryValue) -> Query {
        self.and(build_query_with_operator(field, ">=", value))
    }

    /// Adds a `<=` condition with AND.
    pub fn lte(self, field: &str, value: impl IntoQueryValue) -> Query {
        self.and(build_query_with_operator(field, "<=", value))
    }

    /// Adds a condition with a caller-supplied operator with AND.
    pub fn with_operator(self, field: &str, operator: &str, value: impl IntoQueryValue) -> Query {
        self.and(build_query_with_operator(field, operator, value))
    }
}

impl fmt::Display for Query {
    /// Renders the fragment with arguments interpolated.
    ///
    /// For diagnostics only; statements are always executed with bound
    /// parameters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args = self.args.iter();
        let mut pieces = split_placeholders(&self.fragment).into_iter();
        if let Some(first) = pieces.next() {
            f.write_str(first)?;
        }
        for piece in pieces {
            match args.next() {
                Some(arg) => write!(f, "{}", arg)?,
                None => f.write_str("?")?,
            }
            f.write_str(piece)?;
        }
        Ok(())
    }
}

/// Splits a fragment at its `?` placeholders.
///
/// Always returns one more piece than there are placeholders. Text inside
/// `'...'` literals and `"..."` identifiers is never split; doubled quotes
/// toggle twice and so stay inside the literal.
pub(crate) fn split_placeholders(fragment: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in fragment.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, '?') => {
                pieces.push(&fragment[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&fragment[start..]);
    pieces
}

/// Builds an equality predicate, dispatching on the shape of `value`.
///
/// | input | predicate |
/// |---|---|
/// | null / `None` | `field IS NULL` |
/// | scalar | `field = ?` |
/// | sequence | `field IN (?)` with one argument group |
/// | range | `field BETWEEN ? AND ?` |
/// | composite | `field IN (?)` with the single value |
///
/// An empty field name yields the empty predicate.
///
/// ```
/// use stencil_persistence::query::{eq, QueryArg, SqlValue};
///
/// let q = eq("id", vec![1, 2, 3]);
/// assert_eq!(q.fragment(), "id IN (?)");
/// assert_eq!(
///     q.args(),
///     &[QueryArg::List(vec![
///         SqlValue::Integer(1),
///         SqlValue::Integer(2),
///         SqlValue::Integer(3),
///     ])]
/// );
/// ```
pub fn eq(field: &str, value: impl IntoQueryValue) -> Query {
    if field.is_empty() {
        return Query::default();
    }

    match value.into_query_value() {
        QueryValue::Null => Query::raw(format!("{} IS NULL", field)),
        QueryValue::Scalar(v) => Query::new(format!("{} = ?", field), vec![QueryArg::Value(v)]),
        QueryValue::List(values) => {
            Query::new(format!("{} IN (?)", field), vec![QueryArg::List(values)])
        }
        QueryValue::Range(from, to) => Query::new(
            format!("{} BETWEEN ? AND ?", field),
            vec![QueryArg::Value(from), QueryArg::Value(to)],
        ),
        QueryValue::Composite(v) => {
            Query::new(format!("{} IN (?)", field), vec![QueryArg::Value(v)])
        }
    }
}

/// Builds a predicate with a caller-supplied operator.
///
/// Dispatch mirrors [`eq`]: null renders `field op NULL` (use `IS` or
/// `IS NOT`), sequences render `field op (?)`, ranges render
/// `field op ? AND ?`, everything else `field op ?`.
///
/// ```
/// use stencil_persistence::query::build_query_with_operator;
///
/// assert_eq!(build_query_with_operator("age", ">=", 18).fragment(), "age >= ?");
/// assert_eq!(
///     build_query_with_operator("verified_at", "IS NOT", None::<i64>).fragment(),
///     "verified_at IS NOT NULL"
/// );
/// ```
pub fn build_query_with_operator(field: &str, operator: &str, value: impl IntoQueryValue) -> Query {
    if field.is_empty() {
        return Query::default();
    }

    match value.into_query_value() {
        QueryValue::Null => Query::raw(format!("{} {} NULL", field, operator)),
        QueryValue::Scalar(v) | QueryValue::Composite(v) => Query::new(
            format!("{} {} ?", field, operator),
            vec![QueryArg::Value(v)],
        ),
        QueryValue::List(values) => Query::new(
            format!("{} {} (?)", field, operator),
            vec![QueryArg::List(values)],
        ),
        QueryValue::Range(from, to) => Query::new(
            format!("{} {} ? AND ?", field, operator),
            vec![QueryArg::Value(from), QueryArg::Value(to)],
        ),
    }
}

/// Builds `field BETWEEN ? AND ?`.
pub fn between(field: &str, from: impl Into<SqlValue>, to: impl Into<SqlValue>) -> Query {
    eq(field, QueryValue::Range(from.into(), to.into()))
}

/// Combines predicates with AND.
///
/// Empty predicates are dropped first. A single survivor is returned
/// unchanged; two or more are joined inside one parenthesis group; none
/// yields the empty predicate.
pub fn and(queries: impl IntoIterator<Item = Query>) -> Query {
    combine(queries, "AND")
}

/// Combines predicates with OR. Same rules as [`and`].
pub fn or(queries: impl IntoIterator<Item = Query>) -> Query {
    combine(queries, "OR")
}

fn combine(queries: impl IntoIterator<Item = Query>, operator: &str) -> Query {
    let mut parts: Vec<Query> = queries.into_iter().filter(|q| !q.is_empty()).collect();

    match parts.len() {
        0 => Query::default(),
        1 => parts.remove(0),
        _ => {
            let mut fragments = Vec::with_capacity(parts.len());
            let mut args = Vec::new();
            for part in parts {
                let (fragment, part_args) = part.into_parts();
                fragments.push(fragment);
                args.extend(part_args);
            }
            let separator = format!(" {} ", operator);
            Query::new(format!("({})", fragments.join(&separator)), args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_eq_scalar() {
        let q = eq("name", "John");
        assert_eq!(q.fragment(), "name = ?");
        assert_eq!(q.args(), &[QueryArg::Value(SqlValue::Text("John".to_string()))]);

        let q = eq("is_active", false);
        assert_eq!(q.fragment(), "is_active = ?");
        assert_eq!(q.args(), &[QueryArg::Value(SqlValue::Bool(false))]);
    }

    #[test]
    fn test_eq_null_has_no_args() {
        let q = eq("id", None::<i64>);
        assert_eq!(q.fragment(), "id IS NULL");
        assert!(q.args().is_empty());

        let q = eq("id", SqlValue::Null);
        assert_eq!(q.fragment(), "id IS NULL");
        assert!(q.args().is_empty());
    }

    #[test]
    fn test_eq_list_is_one_arg_group() {
        let q = eq("id", vec![1, 2, 3]);
        assert_eq!(q.fragment(), "id IN (?)");
        assert_eq!(q.args().len(), 1);
        assert_eq!(
            q.args()[0],
            QueryArg::List(vec![
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Integer(3)
            ])
        );
    }

    #[test]
    fn test_eq_empty_list_is_kept() {
        let q = eq("id", Vec::<String>::new());
        assert_eq!(q.fragment(), "id IN (?)");
        assert_eq!(q.args(), &[QueryArg::List(vec![])]);
    }

    #[test]
    fn test_eq_optional_dereferences() {
        let email = Some("a@b.c".to_string());
        assert_eq!(eq("email", email).fragment(), "email = ?");
    }

    #[test]
    fn test_eq_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let q = eq("created_at", ts);
        assert_eq!(q.args(), &[QueryArg::Value(SqlValue::Timestamp(ts))]);
    }

    #[test]
    fn test_eq_composite_falls_back_to_membership() {
        let q = eq("meta", serde_json::json!({"region": "eu"}));
        assert_eq!(q.fragment(), "meta IN (?)");
        assert_eq!(q.args().len(), 1);
        assert!(matches!(q.args()[0], QueryArg::Value(SqlValue::Json(_))));
    }

    #[test]
    fn test_eq_empty_field() {
        assert!(eq("", 1).is_empty());
        assert!(build_query_with_operator("", ">", 1).is_empty());
    }

    #[test]
    fn test_operator_dispatch() {
        assert_eq!(build_query_with_operator("id", "!=", 1).fragment(), "id != ?");
        assert_eq!(
            build_query_with_operator("name", "LIKE", "Jo%").fragment(),
            "name LIKE ?"
        );
        assert_eq!(
            build_query_with_operator("id", "NOT IN", vec!["a", "b"]).fragment(),
            "id NOT IN (?)"
        );
        assert_eq!(
            build_query_with_operator("deleted_at", "IS", None::<String>).fragment(),
            "deleted_at IS NULL"
        );
        assert_eq!(
            build_query_with_operator("n", "NOT BETWEEN", QueryValue::Range(SqlValue::Integer(1), SqlValue::Integer(5)))
                .fragment(),
            "n NOT BETWEEN ? AND ?"
        );
    }

    #[test]
    fn test_between() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let q = between("created_at", from, to);
        assert_eq!(q.fragment(), "created_at BETWEEN ? AND ?");
        assert_eq!(
            q.args(),
            &[
                QueryArg::Value(SqlValue::Timestamp(from)),
                QueryArg::Value(SqlValue::Timestamp(to))
            ]
        );
    }

    #[test]
    fn test_combinator_identity() {
        let q = eq("id", 1);
        assert_eq!(and([q.clone()]), q);
        assert_eq!(or([q.clone()]), q);
        assert_eq!(and([Query::default(), q.clone(), Query::default()]), q);
    }

    #[test]
    fn test_combinator_empty_inputs() {
        assert!(and(Vec::new()).is_empty());
        assert!(or(Vec::new()).is_empty());
        assert!(and([Query::default(), Query::raw("  ")]).is_empty());
        assert!(or([Query::default()]).is_empty());
    }

    #[test]
    fn test_and_or_group_and_concatenate_args() {
        let q = and([eq("id", 1), eq("name", "John")]);
        assert_eq!(q.fragment(), "(id = ? AND name = ?)");
        assert_eq!(q.args().len(), 2);

        let q = or([eq("id", 1), eq("name", "John")]);
        assert_eq!(q.fragment(), "(id = ? OR name = ?)");
    }

    #[test]
    fn test_nested_composition_preserves_precedence() {
        let q = and([
            eq("account_id", "a"),
            or([eq("name", "x"), eq("slug", "y")]),
        ]);
        assert_eq!(q.fragment(), "(account_id = ? AND (name = ? OR slug = ?))");
        assert_eq!(q.placeholder_count(), q.args().len());
    }

    #[test]
    fn test_combinators_do_not_mutate_inputs() {
        let left = eq("a", 1);
        let right = eq("b", 2);
        let _ = and([left.clone(), right.clone()]);
        assert_eq!(left.fragment(), "a = ?");
        assert_eq!(right.fragment(), "b = ?");
    }

    #[test]
    fn test_chained_methods() {
        let q = Query::default()
            .eq("account_id", "a")
            .gte("version", 2)
            .lte("version", 5);
        assert_eq!(q.placeholder_count(), 3);
        assert_eq!(q.args().len(), 3);
        assert!(q.fragment().contains("version >= ?"));
        assert!(q.fragment().contains("version <= ?"));
    }

    #[test]
    fn test_question_marks_in_literals_are_not_placeholders() {
        let q = Query::raw("email LIKE '%?%'");
        assert_eq!(q.placeholder_count(), 0);

        let q = Query::new(
            "note = 'it''s ?' AND \"odd?col\" = ? AND id = ?",
            vec![QueryArg::Value(SqlValue::from(1)), QueryArg::Value(SqlValue::from(2))],
        );
        assert_eq!(q.placeholder_count(), 2);
        assert_eq!(
            q.to_string(),
            "note = 'it''s ?' AND \"odd?col\" = 1 AND id = 2"
        );
    }

    #[test]
    fn test_display_interpolates_args() {
        let q = and([eq("id", vec![1, 2]), eq("name", "o'neil")]);
        assert_eq!(q.to_string(), "(id IN (1, 2) AND name = 'o''neil')");
    }
}
