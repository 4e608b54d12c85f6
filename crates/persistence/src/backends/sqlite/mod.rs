//! SQLite backend implementation.
//!
//! Supports in-memory databases (for tests and tooling) and file-based
//! databases (WAL mode). Connections come from an r2d2 pool; statements run
//! inline on the calling task.
//!
//! # Example
//!
//! ```no_run
//! use stencil_persistence::backends::sqlite::SqliteBackend;
//! use stencil_persistence::entities;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Create the entity tables
//! backend.init_schema(entities::ALL_SCHEMAS)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Storage mapping
//!
//! | Value | Column |
//! |-------|--------|
//! | text, decimal | `TEXT` |
//! | timestamp | `TEXT`, RFC 3339 UTC with nanoseconds |
//! | JSON document | `TEXT` |
//! | bool | `INTEGER` 0/1 |
//! | integer | `INTEGER` |
//! | float | `REAL` |
//!
//! Tables with a soft-delete column never lose rows: `delete` stamps the
//! column, and reads, counts and updates skip stamped rows.

mod backend;
mod schema;
mod sql;
mod transaction;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use transaction::SqliteTransaction;
