//! Error types for the persistence layer.
//!
//! The layer performs no local recovery: every failure raised by the storage
//! handle reaches the caller as one of the variants below, unchanged. Callers
//! distinguish the categories by matching on [`StorageError`] or through the
//! helper predicates ([`StorageError::is_not_found`],
//! [`StorageError::is_constraint_violation`]).

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A lookup that must return a row matched nothing.
    #[error("record not found in {table}")]
    NotFound { table: String },

    /// Uniqueness, foreign-key and other integrity violations.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// The predicate, sort or statement could not be compiled or executed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Transaction lifecycle errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true for the not-found category.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Returns true when storage rejected the write for integrity reasons.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StorageError::Constraint(_))
    }

    /// Returns the constraint kind, if this is a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            StorageError::Constraint(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// The integrity rule a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A unique index rejected a duplicate value.
    Unique,
    /// A primary key rejected a duplicate identity.
    PrimaryKey,
    /// A referenced row does not exist.
    ForeignKey,
    /// A required column was null.
    NotNull,
    /// A CHECK constraint failed.
    Check,
    /// Any other constraint reported by the backend.
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Unique => write!(f, "unique"),
            ConstraintKind::PrimaryKey => write!(f, "primary key"),
            ConstraintKind::ForeignKey => write!(f, "foreign key"),
            ConstraintKind::NotNull => write!(f, "not null"),
            ConstraintKind::Check => write!(f, "check"),
            ConstraintKind::Other => write!(f, "integrity"),
        }
    }
}

/// A constraint violation surfaced by the storage backend.
#[derive(Error, Debug)]
#[error("{kind} constraint violated: {message}")]
pub struct ConstraintError {
    pub kind: ConstraintKind,
    pub message: String,
}

/// Errors raised while compiling or executing a statement.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The backend could not compile or run the statement.
    #[error("malformed query: {message}")]
    Malformed { message: String },

    /// The predicate fragment and its arguments disagree.
    #[error("predicate has {placeholders} placeholders but {args} arguments: {fragment}")]
    PlaceholderMismatch {
        fragment: String,
        placeholders: usize,
        args: usize,
    },

    /// A preload path names a relation the entity does not declare.
    #[error("unknown relation '{relation}' on {table}")]
    UnknownRelation { table: String, relation: String },

    /// The entity's identity columns are unset.
    #[error("primary key of {table} is not set")]
    MissingPrimaryKey { table: String },

    /// A bulk mutation was attempted without a filter.
    #[error("refusing to {operation} every row of {table} without where conditions")]
    MissingWhereConditions { table: String, operation: String },

    /// The sort direction was neither ascending nor descending.
    #[error("invalid sort order: {value}")]
    InvalidSortOrder { value: String },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,

    /// Nested transactions not supported.
    #[error("nested transactions not supported")]
    NestedNotSupported,
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::{ErrorCode, ffi};

        // Statements that fail to compile arrive as SqlInputError.
        let failure = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(*failure),
            rusqlite::Error::SqlInputError { error, .. } => Some(*error),
            _ => None,
        };

        match failure {
            Some(failure) if failure.code == ErrorCode::ConstraintViolation => {
                let kind = match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
                    ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
                    ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
                    _ => ConstraintKind::Other,
                };
                StorageError::Constraint(ConstraintError {
                    kind,
                    message: err.to_string(),
                })
            }
            // SQLITE_ERROR: syntax errors, unknown columns, bad operators
            Some(failure) if failure.code == ErrorCode::Unknown => {
                StorageError::Query(QueryError::Malformed {
                    message: err.to_string(),
                })
            }
            _ => StorageError::Backend(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: err.to_string(),
                source: Some(Box::new(err)),
            }),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StorageError::NotFound {
            table: "accounts".to_string(),
        };
        assert_eq!(err.to_string(), "record not found in accounts");
        assert!(err.is_not_found());
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_constraint_error_display() {
        let err: StorageError = ConstraintError {
            kind: ConstraintKind::Unique,
            message: "UNIQUE constraint failed: accounts.email".to_string(),
        }
        .into();
        assert!(err.is_constraint_violation());
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
        assert!(err.to_string().starts_with("unique constraint violated"));
    }

    #[test]
    fn test_placeholder_mismatch_display() {
        let err = QueryError::PlaceholderMismatch {
            fragment: "id = ? AND name = ?".to_string(),
            placeholders: 2,
            args: 1,
        };
        assert!(err.to_string().contains("2 placeholders but 1 arguments"));
    }

    #[test]
    fn test_transaction_error_from() {
        let err: StorageError = TransactionError::NestedNotSupported.into();
        assert!(matches!(
            err,
            StorageError::Transaction(TransactionError::NestedNotSupported)
        ));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_unique_violation_is_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (email TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t (email) VALUES ('a@b.c')", [])
            .unwrap();
        let err: StorageError = conn
            .execute("INSERT INTO t (email) VALUES ('a@b.c')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_syntax_error_is_malformed_query() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: StorageError = conn.execute("SELEC 1", []).unwrap_err().into();
        assert!(matches!(err, StorageError::Query(QueryError::Malformed { .. })));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_prepare_failures_are_malformed_query() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (email TEXT)", []).unwrap();

        for sql in ["SELECT * FROM t WHERE email => 'x'", "SELECT * FROM t WHERE nme = 'x'"] {
            let err: StorageError = conn.prepare(sql).unwrap_err().into();
            assert!(
                matches!(err, StorageError::Query(QueryError::Malformed { .. })),
                "{sql}: {err:?}"
            );
        }
    }
}
