//! Generic repository façade.
//!
//! [`Repository<T>`] exposes a uniform CRUD contract for any [`Entity`]. It
//! is a thin, stateless wrapper around a shared [`Storage`] handle, so it is
//! cheap to clone and safe to share across tasks. Storage errors are
//! returned exactly as the backend raised them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stencil_persistence::backends::sqlite::SqliteBackend;
//! use stencil_persistence::entities::{self, Account};
//! use stencil_persistence::query;
//! use stencil_persistence::repository::Repository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema(entities::ALL_SCHEMAS)?;
//!
//! let accounts = Repository::<Account>::new(Arc::new(backend));
//!
//! let mut account = Account::new("ada@example.com");
//! accounts.create(&mut account).await?;
//!
//! let found = accounts.get(query::eq("email", "ada@example.com")).await?;
//! assert_eq!(found.id, account.id);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::codec::{self, Record};
use crate::core::{Entity, SelectStatement, Storage, StorageTransaction, TableSchema};
use crate::error::{QueryError, StorageError, StorageResult};
use crate::paginator::{Paginator, hydrate};
use crate::query::{self, Query, SqlValue};
use crate::types::{
    CreateOptions, FindOptions, Page, SortOrder, SortSpec, parse_sort_list,
};

/// Filter accepted by the repository's read and bulk-write operations.
///
/// A [`Condition::Query`] is always used as-is; there is no way to combine
/// it with a raw condition at the same call site.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Condition {
    /// A predicate built with the query builder.
    Query(Query),
    /// Equality on each listed column, combined with AND.
    Fields(BTreeMap<String, SqlValue>),
    /// Equality on the primary key.
    PrimaryKey(SqlValue),
    /// A raw condition without arguments.
    Sql(String),
    /// No filter.
    #[default]
    All,
}

impl Condition {
    /// Equality on a single column.
    pub fn field(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Condition::Fields(BTreeMap::from([(name.into(), value.into())]))
    }

    /// Lowers the condition into a predicate for `schema`.
    pub fn into_query(self, schema: &TableSchema) -> Query {
        match self {
            Condition::Query(query) => query,
            Condition::Fields(fields) => {
                query::and(fields.into_iter().map(|(name, value)| query::eq(&name, value)))
            }
            Condition::PrimaryKey(value) => query::eq(schema.primary_key, value),
            Condition::Sql(sql) => Query::raw(sql),
            Condition::All => Query::default(),
        }
    }
}

impl From<Query> for Condition {
    fn from(query: Query) -> Self {
        Condition::Query(query)
    }
}

impl From<BTreeMap<String, SqlValue>> for Condition {
    fn from(fields: BTreeMap<String, SqlValue>) -> Self {
        Condition::Fields(fields)
    }
}

/// Column assignments for [`Repository::update_many`], applied verbatim.
///
/// ```
/// use stencil_persistence::query::SqlValue;
/// use stencil_persistence::repository::Changes;
///
/// let changes = Changes::new()
///     .set("active", false)
///     .set("deleted_at", SqlValue::Null);
/// assert_eq!(changes.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes(Record);

impl Changes {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `column`. A later assignment to the same column wins.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Number of assigned columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The assignments as a row.
    pub fn as_record(&self) -> &Record {
        &self.0
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// CRUD access to one entity type.
pub struct Repository<T: Entity> {
    storage: Arc<dyn Storage>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &T::schema().name)
            .field("backend", &self.storage.backend_name())
            .finish()
    }
}

impl<T: Entity> Repository<T> {
    /// Creates a repository over a storage handle.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            _entity: PhantomData,
        }
    }

    /// Returns the storage handle.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Returns a repository for `T` on another handle, such as a transaction.
    pub fn with_storage(&self, storage: Arc<dyn Storage>) -> Self {
        Self::new(storage)
    }

    /// Returns a paginator over the same handle.
    pub fn paginator(&self) -> Paginator<T> {
        Paginator::new(Arc::clone(&self.storage))
    }

    fn schema(&self) -> &'static TableSchema {
        T::schema()
    }

    fn statement(&self, filter: Query) -> SelectStatement {
        SelectStatement::new(self.schema()).with_filter(filter)
    }

    async fn fetch(&self, statement: &SelectStatement, options: &FindOptions) -> StorageResult<Vec<T>> {
        let records = self.storage.fetch(statement).await?;
        hydrate::<T>(self.storage.as_ref(), &records, options).await
    }

    async fn first(&self, filter: Query, preloads: &FindOptions) -> StorageResult<T> {
        let statement = self
            .statement(filter)
            .with_order_by(self.schema().primary_key, SortOrder::Asc, false)
            .with_limit(1);
        self.fetch(&statement, preloads)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound {
                table: self.schema().name.to_string(),
            })
    }

    fn identity(&self, entity: &T) -> StorageResult<Query> {
        let key = codec::primary_key(entity)?;
        if key.is_zero() {
            return Err(QueryError::MissingPrimaryKey {
                table: self.schema().name.to_string(),
            }
            .into());
        }
        Ok(query::eq(self.schema().primary_key, key))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts one entity.
    ///
    /// `before_create` runs first, so generated fields are visible on
    /// `entity` afterwards.
    ///
    /// # Errors
    ///
    /// * `StorageError::Constraint` - a uniqueness or foreign-key rule failed
    pub async fn create(&self, entity: &mut T) -> StorageResult<()> {
        entity.before_create();
        let record = codec::encode(entity)?;
        self.storage
            .insert(self.schema(), std::slice::from_ref(&record), None)
            .await?;
        Ok(())
    }

    /// Inserts many entities in one statement.
    ///
    /// The upsert clause in `options` is applied only when set. An empty
    /// slice is a no-op.
    pub async fn create_many(&self, entities: &mut [T], options: CreateOptions) -> StorageResult<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let mut records = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            entity.before_create();
            records.push(codec::encode(entity)?);
        }
        self.storage
            .insert(self.schema(), &records, options.on_conflict.as_ref())
            .await
    }

    /// Writes the non-zero, non-key fields of `entity`, matched by primary key.
    ///
    /// Fields holding their zero value are skipped, so this cannot clear a
    /// field; use [`Repository::update_many`] for that. Nothing is written
    /// when every field is zero.
    ///
    /// # Errors
    ///
    /// * `QueryError::MissingPrimaryKey` - the primary key is unset
    pub async fn update(&self, entity: &mut T) -> StorageResult<()> {
        entity.before_update();
        let filter = self.identity(entity)?;
        let primary_key = self.schema().primary_key;
        let changes: Record = codec::encode(entity)?
            .into_iter()
            .filter(|(column, value)| column != primary_key && !value.is_zero())
            .collect();
        if changes.is_empty() {
            return Ok(());
        }
        self.storage.update(self.schema(), &filter, &changes).await?;
        Ok(())
    }

    /// Applies `changes` to every row matching `condition`. Returns rows affected.
    ///
    /// # Errors
    ///
    /// * `QueryError::MissingWhereConditions` - the condition is empty
    pub async fn update_many(
        &self,
        condition: impl Into<Condition>,
        changes: Changes,
    ) -> StorageResult<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let filter = condition.into().into_query(self.schema());
        self.storage
            .update(self.schema(), &filter, changes.as_record())
            .await
    }

    /// Deletes `entity` by primary key.
    ///
    /// Soft-deleted tables mark the row instead of removing it.
    pub async fn delete(&self, entity: &T) -> StorageResult<()> {
        let filter = self.identity(entity)?;
        self.storage.delete(self.schema(), &filter).await?;
        Ok(())
    }

    /// Deletes every row matching `condition`. Returns rows affected.
    ///
    /// # Errors
    ///
    /// * `QueryError::MissingWhereConditions` - the condition is empty
    pub async fn delete_by_field_name(&self, condition: impl Into<Condition>) -> StorageResult<u64> {
        let filter = condition.into().into_query(self.schema());
        self.storage.delete(self.schema(), &filter).await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns every row matching `condition`; empty when nothing matches.
    pub async fn find(&self, condition: impl Into<Condition>) -> StorageResult<Vec<T>> {
        let filter = condition.into().into_query(self.schema());
        self.fetch(&self.statement(filter), &FindOptions::default())
            .await
    }

    /// Returns the first row matching `condition`, ordered by primary key.
    ///
    /// # Errors
    ///
    /// * `StorageError::NotFound` - nothing matches
    pub async fn get(&self, condition: impl Into<Condition>) -> StorageResult<T> {
        let filter = condition.into().into_query(self.schema());
        self.first(filter, &FindOptions::default()).await
    }

    /// Returns the first row matching `condition`.
    ///
    /// # Errors
    ///
    /// * `StorageError::NotFound` - nothing matches
    pub async fn find_by_field_name(&self, condition: impl Into<Condition>) -> StorageResult<T> {
        self.get(condition).await
    }

    /// Returns the first row matching `condition` with relations loaded.
    ///
    /// # Errors
    ///
    /// * `StorageError::NotFound` - nothing matches
    /// * `QueryError::UnknownRelation` - a path names an undeclared relation
    pub async fn find_by_field_name_with_preload<I, S>(
        &self,
        condition: impl Into<Condition>,
        preloads: I,
    ) -> StorageResult<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = condition.into().into_query(self.schema());
        self.first(filter, &FindOptions::new().with_preloads(preloads))
            .await
    }

    /// Returns one page of rows in storage order.
    pub async fn find_many<I, S>(
        &self,
        condition: impl Into<Condition>,
        page: u32,
        page_size: u32,
        preloads: I,
    ) -> StorageResult<Vec<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = FindOptions::new()
            .with_pagination(page, page_size)
            .with_preloads(preloads);
        self.find_many_with_options(condition, &options).await
    }

    /// Returns one page of rows ordered by a raw `"field dir, ..."` list.
    ///
    /// # Errors
    ///
    /// * `QueryError::InvalidSortOrder` - `order` does not parse
    pub async fn find_many_with_order<I, S>(
        &self,
        condition: impl Into<Condition>,
        page: u32,
        page_size: u32,
        order: &str,
        preloads: I,
    ) -> StorageResult<Vec<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = FindOptions::new()
            .with_pagination(page, page_size)
            .with_preloads(preloads);
        for SortSpec { field, order } in parse_sort_list(order)? {
            options = options.with_order_by(field, order);
        }
        self.find_many_with_options(condition, &options).await
    }

    /// Filters, sorts, paginates and preloads without a count query.
    pub async fn find_many_with_options(
        &self,
        condition: impl Into<Condition>,
        options: &FindOptions,
    ) -> StorageResult<Vec<T>> {
        let filter = condition.into().into_query(self.schema());
        let mut statement = self.statement(filter);
        if options.is_pagination_set() {
            statement = statement
                .with_limit(u64::from(options.page_size))
                .with_offset(options.offset());
        }
        for spec in options.sort.iter().filter(|s| !s.field.is_empty()) {
            statement = statement.with_order_by(spec.field.clone(), spec.order, false);
        }
        self.fetch(&statement, options).await
    }

    /// Returns a page with totals, delegating to [`Paginator::find`].
    pub async fn find_with_pagination(
        &self,
        condition: impl Into<Condition>,
        options: &FindOptions,
    ) -> StorageResult<Page<T>> {
        let filter = condition.into().into_query(self.schema());
        self.paginator()
            .find(&filter, options.page, options.page_size, options)
            .await
    }

    /// Counts rows matching `condition`.
    pub async fn count(&self, condition: impl Into<Condition>) -> StorageResult<u64> {
        let filter = condition.into().into_query(self.schema());
        self.storage.count(&self.statement(filter)).await
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Runs `f` inside a transaction.
    ///
    /// `f` receives a transaction-scoped handle; build repositories on it
    /// with [`Repository::with_storage`] or [`Repository::new`]. The
    /// transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`, in which case that error is returned unchanged.
    ///
    /// # Errors
    ///
    /// * `TransactionError::NestedNotSupported` - this repository is already
    ///   bound to a transaction handle
    ///
    /// ```no_run
    /// # use stencil_persistence::entities::{Account, Key};
    /// # use stencil_persistence::repository::Repository;
    /// # use stencil_persistence::error::StorageError;
    /// # async fn example(accounts: Repository<Account>) -> Result<(), StorageError> {
    /// accounts
    ///     .transaction(|tx| async move {
    ///         let accounts = Repository::<Account>::new(tx.clone());
    ///         let keys = Repository::<Key>::new(tx);
    ///
    ///         let mut account = Account::new("ada@example.com");
    ///         accounts.create(&mut account).await?;
    ///         keys.create(&mut Key::new(&account.id, "default", "pub", "priv")).await?;
    ///         Ok::<_, StorageError>(())
    ///     })
    ///     .await
    /// # }
    /// ```
    pub async fn transaction<F, Fut, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(Arc<dyn Storage>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<StorageError> + Display,
    {
        let tx: Arc<dyn StorageTransaction> = Arc::from(self.storage.begin().await?);
        let handle: Arc<dyn Storage> = tx.clone();

        match f(handle).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(
                    table = self.schema().name,
                    error = %err,
                    "Rolling back transaction"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        table = self.schema().name,
                        error = %rollback_err,
                        "Transaction rollback failed"
                    );
                }
                Err(err)
            }
        }
    }
}
