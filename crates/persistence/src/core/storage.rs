//! The storage handle trait.
//!
//! This module defines [`Storage`], the narrow set of primitives the
//! repository and paginator are written against, and [`SelectStatement`],
//! the value describing a read. Backends compile statements into their own
//! dialect; everything above this trait is backend-agnostic.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::query::{Query, QueryArg};
use crate::types::{OnConflict, SortOrder};

use super::codec::Record;
use super::entity::TableSchema;

/// A join clause with its own positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Full clause text, e.g. `LEFT JOIN keys ON keys.account_id = accounts.id`.
    pub clause: String,
    /// Arguments for `?` placeholders in the clause.
    pub args: Vec<QueryArg>,
}

impl Join {
    /// Creates a join clause without arguments.
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            args: Vec::new(),
        }
    }

    /// Creates a join clause with arguments.
    pub fn with_args(clause: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self {
            clause: clause.into(),
            args,
        }
    }
}

/// A single ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column or expression.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
    /// Whether NULLs sort after every non-null value.
    pub nulls_last: bool,
}

/// A read against one table.
///
/// ```
/// use stencil_persistence::core::SelectStatement;
/// use stencil_persistence::entities::Account;
/// use stencil_persistence::core::Entity;
/// use stencil_persistence::query;
/// use stencil_persistence::types::SortOrder;
///
/// let statement = SelectStatement::new(Account::schema())
///     .with_filter(query::eq("email", "a@example.com"))
///     .with_order_by("created_at", SortOrder::Desc, true)
///     .with_limit(10);
///
/// assert_eq!(statement.table_name(), "accounts");
/// ```
#[derive(Debug, Clone)]
pub struct SelectStatement {
    /// Schema of the primary table.
    pub schema: &'static TableSchema,
    /// Table name override; the schema's table when unset.
    pub table: Option<String>,
    /// Selected columns; every column of the table when empty.
    pub columns: Vec<String>,
    /// Row filter.
    pub filter: Query,
    /// Join clauses, in order.
    pub joins: Vec<Join>,
    /// GROUP BY clauses.
    pub group_by: Vec<String>,
    /// ORDER BY terms.
    pub order_by: Vec<OrderBy>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// A complete caller-written statement read in place of the table.
    ///
    /// When set, the table, columns, joins and grouping are ignored and
    /// soft-deleted rows are not filtered; `filter`, ordering and
    /// windowing apply to the raw rows.
    pub raw: Option<Query>,
}

impl SelectStatement {
    /// Selects every row of a table.
    pub fn new(schema: &'static TableSchema) -> Self {
        Self {
            schema,
            table: None,
            columns: Vec::new(),
            filter: Query::default(),
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            raw: None,
        }
    }

    /// The table the statement reads from.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(self.schema.name)
    }

    /// Overrides the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Restricts the selected columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the row filter.
    pub fn with_filter(mut self, filter: Query) -> Self {
        self.filter = filter;
        self
    }

    /// Appends a join clause.
    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Appends a GROUP BY clause.
    pub fn with_group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by.push(clause.into());
        self
    }

    /// Appends an ORDER BY term.
    pub fn with_order_by(
        mut self,
        field: impl Into<String>,
        order: SortOrder,
        nulls_last: bool,
    ) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            order,
            nulls_last,
        });
        self
    }

    /// Sets the row limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Reads from a raw statement instead of the table.
    pub fn with_raw(mut self, raw: Query) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Drops ordering and windowing, keeping what affects the row count.
    pub fn for_count(&self) -> Self {
        Self {
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// The storage handle the data-access layer delegates to.
///
/// Implementations must be safe to share across tasks. A handle returned by
/// [`Storage::begin`] scopes every call to one transaction.
///
/// Tables with a soft-delete column are handled by the backend: `delete`
/// marks rows, and `fetch`, `count` and `update` skip marked rows.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Inserts rows. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// * `StorageError::Constraint` - a uniqueness or foreign-key rule failed
    ///   and no `on_conflict` clause resolved it
    async fn insert(
        &self,
        schema: &'static TableSchema,
        records: &[Record],
        on_conflict: Option<&OnConflict>,
    ) -> StorageResult<u64>;

    /// Runs a read and returns the rows.
    async fn fetch(&self, statement: &SelectStatement) -> StorageResult<Vec<Record>>;

    /// Counts the rows a read would return, ignoring ordering and windowing.
    async fn count(&self, statement: &SelectStatement) -> StorageResult<u64>;

    /// Sets `changes` on every row matching `filter`. Returns rows affected.
    ///
    /// # Errors
    ///
    /// * `QueryError::MissingWhereConditions` - the filter is empty
    async fn update(
        &self,
        schema: &'static TableSchema,
        filter: &Query,
        changes: &Record,
    ) -> StorageResult<u64>;

    /// Deletes every row matching `filter`. Returns rows affected.
    ///
    /// # Errors
    ///
    /// * `QueryError::MissingWhereConditions` - the filter is empty
    async fn delete(&self, schema: &'static TableSchema, filter: &Query) -> StorageResult<u64>;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// * `TransactionError::NestedNotSupported` - called on a transaction handle
    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>>;
}

/// A storage handle scoped to one transaction.
///
/// After `commit` or `rollback` every call fails with
/// `TransactionError::InvalidTransaction`. Dropping an active transaction
/// rolls it back.
#[async_trait]
pub trait StorageTransaction: Storage {
    /// Commits the transaction.
    async fn commit(&self) -> StorageResult<()>;

    /// Rolls the transaction back.
    async fn rollback(&self) -> StorageResult<()>;

    /// Returns true until the transaction is committed or rolled back.
    fn is_active(&self) -> bool;
}
