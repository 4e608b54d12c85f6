//! Transaction support for the SQLite backend.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;

use crate::core::{Record, SelectStatement, Storage, StorageTransaction, TableSchema};
use crate::error::{StorageError, StorageResult, TransactionError};
use crate::query::Query;
use crate::types::OnConflict;

use super::sql;

type Connection = PooledConnection<SqliteConnectionManager>;

/// A SQLite transaction holding one pooled connection until it ends.
pub struct SqliteTransaction {
    /// The connection used for this transaction.
    conn: Mutex<Connection>,
    /// Whether the transaction is still active.
    active: AtomicBool,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl SqliteTransaction {
    /// Starts a write transaction on `conn`.
    pub(crate) fn new(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE").map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("Failed to begin transaction: {}", e),
            })
        })?;
        tracing::debug!("Transaction started");

        Ok(Self {
            conn: Mutex::new(conn),
            active: AtomicBool::new(true),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        if !self.is_active() {
            return Err(StorageError::Transaction(
                TransactionError::InvalidTransaction,
            ));
        }
        Ok(self.conn.lock())
    }

    fn finish(&self, statement: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        self.active.store(false, Ordering::SeqCst);

        if let Err(e) = conn.execute_batch(statement) {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %rollback, "Rollback after failed {} also failed", statement);
            }
            return Err(StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("{} failed: {}", statement, e),
            }));
        }

        tracing::debug!("Transaction {}", statement.to_ascii_lowercase());
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteTransaction {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(
        &self,
        schema: &'static TableSchema,
        records: &[Record],
        on_conflict: Option<&OnConflict>,
    ) -> StorageResult<u64> {
        let conn = self.conn()?;
        sql::insert(&conn, schema, records, on_conflict)
    }

    async fn fetch(&self, statement: &SelectStatement) -> StorageResult<Vec<Record>> {
        let conn = self.conn()?;
        sql::fetch(&conn, statement)
    }

    async fn count(&self, statement: &SelectStatement) -> StorageResult<u64> {
        let conn = self.conn()?;
        sql::count(&conn, statement)
    }

    async fn update(
        &self,
        schema: &'static TableSchema,
        filter: &Query,
        changes: &Record,
    ) -> StorageResult<u64> {
        let conn = self.conn()?;
        sql::update(&conn, schema, filter, changes)
    }

    async fn delete(&self, schema: &'static TableSchema, filter: &Query) -> StorageResult<u64> {
        let conn = self.conn()?;
        sql::delete(&conn, schema, filter)
    }

    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        Err(StorageError::Transaction(
            TransactionError::NestedNotSupported,
        ))
    }
}

#[async_trait]
impl StorageTransaction for SqliteTransaction {
    async fn commit(&self) -> StorageResult<()> {
        self.finish("COMMIT")
    }

    async fn rollback(&self) -> StorageResult<()> {
        self.finish("ROLLBACK")
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.conn.get_mut().execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "Failed to roll back abandoned transaction");
            } else {
                tracing::debug!("Abandoned transaction rolled back");
            }
        }
    }
}
