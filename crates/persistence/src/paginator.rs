//! Paginated listing over one entity's table.
//!
//! A [`Paginator`] carries reusable statement configuration (selected
//! columns, joins, grouping, a table override, an optional raw statement
//! and the count toggle). The
//! predicate and options are passed to each call and nothing is retained
//! between calls, so one paginator can serve any number of concurrent
//! listings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stencil_persistence::backends::sqlite::SqliteBackend;
//! use stencil_persistence::entities::Template;
//! use stencil_persistence::paginator::Paginator;
//! use stencil_persistence::query;
//! use stencil_persistence::types::FindOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(SqliteBackend::in_memory()?);
//! let paginator = Paginator::<Template>::new(backend);
//!
//! let page = paginator
//!     .find(
//!         &query::eq("account_id", "acc-1"),
//!         1,
//!         20,
//!         &FindOptions::new().with_sort_asc("name"),
//!     )
//!     .await?;
//!
//! println!("{} of {} templates", page.data.len(), page.record_count);
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::codec::{decode_row, from_object};
use crate::core::{Entity, Join, Record, SelectStatement, Storage};
use crate::error::StorageResult;
use crate::preload::preload;
use crate::query::Query;
use crate::types::{
    DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, FindOptions, Page, PageTotals, SortSpec,
    calculate_page_count,
};

/// Executes paged reads of `T` with a consistent page/record-count contract.
pub struct Paginator<T: Entity> {
    storage: Arc<dyn Storage>,
    columns: Vec<String>,
    joins: Vec<Join>,
    group_by: Vec<String>,
    table: Option<String>,
    raw: Option<Query>,
    disable_count: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Paginator<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            columns: self.columns.clone(),
            joins: self.joins.clone(),
            group_by: self.group_by.clone(),
            table: self.table.clone(),
            raw: self.raw.clone(),
            disable_count: self.disable_count,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("backend", &self.storage.backend_name())
            .field("table", &self.table.as_deref().unwrap_or(T::schema().name))
            .field("columns", &self.columns)
            .field("joins", &self.joins.len())
            .field("group_by", &self.group_by)
            .field("raw", &self.raw.as_ref().map(Query::fragment))
            .field("disable_count", &self.disable_count)
            .finish()
    }
}

impl<T: Entity> Paginator<T> {
    /// Creates a paginator over `T`'s table.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            columns: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            table: None,
            raw: None,
            disable_count: false,
            _entity: PhantomData,
        }
    }

    /// Adds selected columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds a join clause.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Adds GROUP BY clauses.
    pub fn group<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(clauses.into_iter().map(Into::into));
        self
    }

    /// Reads from another table with the same shape.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Reads rows from a caller-written statement instead of the table.
    ///
    /// Selected columns, joins, grouping, the table override and the
    /// soft-delete filter no longer apply. The predicate passed to
    /// [`find`](Self::find) filters the raw rows, and sorting and paging
    /// wrap them, so the raw rows must carry every sorted column
    /// (including [`DEFAULT_SORT_FIELD`] when no sort is given).
    pub fn raw(mut self, statement: Query) -> Self {
        self.raw = Some(statement);
        self
    }

    /// Skips the count query; `page_count` and `record_count` stay zero.
    pub fn disable_count(mut self) -> Self {
        self.disable_count = true;
        self
    }

    fn statement(&self, query: &Query) -> SelectStatement {
        let mut statement = SelectStatement::new(T::schema())
            .with_columns(self.columns.iter().cloned())
            .with_filter(query.clone());
        statement.table = self.table.clone();
        statement.joins = self.joins.clone();
        statement.group_by = self.group_by.clone();
        statement.raw = self.raw.clone();
        statement
    }

    /// Fetches one page of rows matching `query`.
    ///
    /// Without sort directives the rows are ordered by
    /// [`DEFAULT_SORT_FIELD`] descending. Every sort places NULLs last. When
    /// `page` or `page_size` is zero the whole filtered set is returned and
    /// both are echoed back unchanged.
    ///
    /// # Errors
    ///
    /// Any storage error aborts the call and is returned unchanged.
    pub async fn find(
        &self,
        query: &Query,
        page: u32,
        page_size: u32,
        options: &FindOptions,
    ) -> StorageResult<Page<T>> {
        let sort: Vec<SortSpec> = if options.is_sort_set() {
            options
                .sort
                .iter()
                .filter(|s| !s.field.is_empty())
                .cloned()
                .collect()
        } else {
            vec![SortSpec::new(DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER)]
        };

        let mut statement = self.statement(query);

        let (page_count, record_count) = if self.disable_count {
            (0, 0)
        } else {
            let record_count = self.storage.count(&statement.for_count()).await?;
            (calculate_page_count(record_count, page_size), record_count)
        };

        if page > 0 && page_size > 0 {
            statement = statement
                .with_offset(u64::from(page - 1) * u64::from(page_size))
                .with_limit(u64::from(page_size));
        }

        for spec in sort {
            statement = statement.with_order_by(spec.field, spec.order, true);
        }

        let records = self.storage.fetch(&statement).await?;
        let data = hydrate::<T>(self.storage.as_ref(), &records, options).await?;

        Ok(Page {
            page,
            page_size,
            page_count,
            record_count,
            data,
        })
    }

    /// Computes totals for `query` without fetching rows.
    pub async fn count(&self, query: &Query, page_size: u32) -> StorageResult<PageTotals> {
        let record_count = self.storage.count(&self.statement(query)).await?;
        Ok(PageTotals::new(record_count, page_size))
    }
}

/// Decodes rows, runs preloads and deserializes the entities.
pub(crate) async fn hydrate<T: Entity>(
    storage: &dyn Storage,
    records: &[Record],
    options: &FindOptions,
) -> StorageResult<Vec<T>> {
    let schema = T::schema();
    let mut rows = records
        .iter()
        .map(|record| decode_row(schema, record))
        .collect::<StorageResult<Vec<_>>>()?;

    if options.is_preload_set() {
        preload(storage, schema, &mut rows, &options.preloads).await?;
    }

    rows.into_iter().map(from_object::<T>).collect()
}
