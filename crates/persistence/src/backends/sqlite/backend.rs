//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::core::{Record, SelectStatement, Storage, StorageTransaction, TableSchema};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::Query;
use crate::types::OnConflict;

use super::transaction::SqliteTransaction;
use super::{schema, sql};

/// SQLite storage backend.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// The database is private to this backend and lives as long as it
    /// does. Its pool holds exactly one connection, so concurrent callers
    /// take turns; a caller waiting on an open transaction blocks until
    /// it finishes or `connection_timeout_ms` elapses.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    ///
    /// The path `:memory:` selects an in-memory database, which ignores
    /// `max_connections` and `min_connections`.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        };

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", foreign_keys)?;
            if wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            Ok(())
        });

        // An in-memory database belongs to its one connection, which must
        // never be recycled.
        let (max_size, min_idle) = if is_memory {
            (1, 1)
        } else {
            (config.max_connections, config.min_connections)
        };
        let mut builder = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_idle))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })?;

        tracing::info!(
            path = %path_str,
            is_memory,
            max_connections = max_size,
            "SQLite backend ready"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
        })
    }

    /// Creates the given tables and their indexes if they do not exist.
    ///
    /// Referenced tables must precede the tables that reference them.
    pub fn init_schema(&self, schemas: &[&TableSchema]) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn, schemas)
    }

    /// Returns whether this backend uses an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl Storage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(
        &self,
        schema: &'static TableSchema,
        records: &[Record],
        on_conflict: Option<&OnConflict>,
    ) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        sql::insert(&conn, schema, records, on_conflict)
    }

    async fn fetch(&self, statement: &SelectStatement) -> StorageResult<Vec<Record>> {
        let conn = self.get_connection()?;
        sql::fetch(&conn, statement)
    }

    async fn count(&self, statement: &SelectStatement) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        sql::count(&conn, statement)
    }

    async fn update(
        &self,
        schema: &'static TableSchema,
        filter: &Query,
        changes: &Record,
    ) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        sql::update(&conn, schema, filter, changes)
    }

    async fn delete(&self, schema: &'static TableSchema, filter: &Query) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        sql::delete(&conn, schema, filter)
    }

    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        let conn = self.get_connection()?;
        Ok(Box::new(SqliteTransaction::new(conn)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ALL_SCHEMAS;
    use crate::error::TransactionError;
    use crate::query::{self, SqlValue};

    static COUNTERS: TableSchema = TableSchema {
        name: "counters",
        columns: &[
            crate::core::Column::new("id", crate::core::ColumnType::Text),
            crate::core::Column::new("value", crate::core::ColumnType::Integer),
        ],
        primary_key: "id",
        relations: &[],
        soft_delete: None,
    };

    fn counter(id: &str, value: i64) -> Record {
        Record::from([
            ("id".to_string(), SqlValue::from(id)),
            ("value".to_string(), SqlValue::Integer(value)),
        ])
    }

    fn create_test_backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema(&[&COUNTERS]).unwrap();
        backend
    }

    #[test]
    fn test_in_memory_backend() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.is_memory());
        assert_eq!(backend.backend_name(), "sqlite");
    }

    #[test]
    fn test_backend_initialization() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema(ALL_SCHEMAS).unwrap();
        backend.init_schema(ALL_SCHEMAS).unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config: SqliteBackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SqliteBackendConfig::default());
        assert_eq!(config.max_connections, 10);
        assert!(config.enable_foreign_keys);
    }

    #[test]
    fn test_in_memory_backends_are_isolated() {
        let first = create_test_backend();
        let second = SqliteBackend::in_memory().unwrap();

        let conn = first.get_connection().unwrap();
        conn.execute_batch("INSERT INTO counters (id, value) VALUES ('a', 1)")
            .unwrap();

        let missing = second
            .get_connection()
            .unwrap()
            .execute_batch("SELECT * FROM counters");
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_memory_database_uses_one_connection() {
        let backend = create_test_backend();
        assert_eq!(backend.pool.max_size(), 1);

        backend
            .insert(&COUNTERS, &[counter("a", 1), counter("b", 2)], None)
            .await
            .unwrap();
        let rows = backend
            .fetch(&SelectStatement::new(&COUNTERS))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_memory_connection_waits_then_times_out() {
        let config = SqliteBackendConfig {
            connection_timeout_ms: 50,
            ..Default::default()
        };
        let backend = SqliteBackend::with_config(":memory:", config).unwrap();

        let held = backend.get_connection().unwrap();
        assert!(matches!(
            backend.get_connection(),
            Err(StorageError::Backend(BackendError::PoolExhausted { .. }))
        ));
        drop(held);
        assert!(backend.get_connection().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_share_memory_database() {
        let backend = std::sync::Arc::new(create_test_backend());

        let mut tasks = Vec::new();
        for t in 0..8 {
            let backend = std::sync::Arc::clone(&backend);
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    let id = format!("{}-{}", t, i);
                    backend.insert(&COUNTERS, &[counter(&id, i)], None).await?;
                    backend.count(&SelectStatement::new(&COUNTERS)).await?;
                }
                Ok::<_, StorageError>(())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(
            backend.count(&SelectStatement::new(&COUNTERS)).await.unwrap(),
            400
        );
    }

    #[tokio::test]
    async fn test_storage_operations() {
        let backend = create_test_backend();
        backend
            .insert(&COUNTERS, &[counter("a", 1), counter("b", 2)], None)
            .await
            .unwrap();

        let changes = Record::from([("value".to_string(), SqlValue::Integer(10))]);
        let updated = backend
            .update(&COUNTERS, &query::eq("id", "a"), &changes)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let rows = backend
            .fetch(&SelectStatement::new(&COUNTERS).with_filter(query::eq("id", "a")))
            .await
            .unwrap();
        assert_eq!(rows[0]["value"], SqlValue::Integer(10));

        let deleted = backend
            .delete(&COUNTERS, &query::eq("id", "b"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            backend.count(&SelectStatement::new(&COUNTERS)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_key_is_constraint_error() {
        let backend = create_test_backend();
        backend
            .insert(&COUNTERS, &[counter("a", 1)], None)
            .await
            .unwrap();
        let err = backend
            .insert(&COUNTERS, &[counter("a", 2)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let backend = create_test_backend();
        backend
            .insert(&COUNTERS, &[counter("a", 1)], None)
            .await
            .unwrap();
        backend
            .insert(
                &COUNTERS,
                &[counter("a", 5)],
                Some(&OnConflict::update_all(Vec::<String>::new())),
            )
            .await
            .unwrap();

        let rows = backend
            .fetch(&SelectStatement::new(&COUNTERS))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], SqlValue::Integer(5));
    }

    #[tokio::test]
    async fn test_transaction_lifecycle() {
        let backend = create_test_backend();

        let tx = backend.begin().await.unwrap();
        assert!(tx.is_active());
        tx.insert(&COUNTERS, &[counter("a", 1)], None)
            .await
            .unwrap();
        assert!(matches!(
            tx.begin().await,
            Err(StorageError::Transaction(TransactionError::NestedNotSupported))
        ));
        tx.commit().await.unwrap();
        assert!(!tx.is_active());

        assert!(matches!(
            tx.fetch(&SelectStatement::new(&COUNTERS)).await,
            Err(StorageError::Transaction(TransactionError::InvalidTransaction))
        ));
        assert!(matches!(
            tx.commit().await,
            Err(StorageError::Transaction(TransactionError::InvalidTransaction))
        ));
        drop(tx);

        assert_eq!(
            backend.count(&SelectStatement::new(&COUNTERS)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let backend = create_test_backend();
        {
            let tx = backend.begin().await.unwrap();
            tx.insert(&COUNTERS, &[counter("a", 1)], None)
                .await
                .unwrap();
        }
        assert_eq!(
            backend.count(&SelectStatement::new(&COUNTERS)).await.unwrap(),
            0
        );
    }

    #[test]
    fn test_file_backend_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("stencil.db")).unwrap();
        assert!(!backend.is_memory());

        let mode: String = backend
            .get_connection()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
