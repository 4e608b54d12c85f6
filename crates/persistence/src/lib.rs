//! Stencil Persistence Layer
//!
//! This crate is the data-access layer of the Stencil template manager. It
//! provides a generic repository over any table-backed entity, a composable
//! predicate builder, and a paginator that returns a page of rows together
//! with record and page totals.
//!
//! # Features
//!
//! - **Repository**: create, bulk create with upsert, partial update, bulk
//!   update, delete, lookups, paged finds and transactions for any [`Entity`]
//! - **Predicate builder**: equality, set membership, ranges and custom
//!   operators, grouped with AND/OR, always with bound parameters
//! - **Pagination**: ordered page reads with an optional count query
//! - **Preloading**: eager loading of declared relations, including nested
//!   paths such as `"account.keys"`
//! - **Soft deletion**: tables with a deletion marker keep their rows
//!
//! # Backend Features
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`query`] - predicate builder and bind values
//! - [`types`] - find/create options and page types
//! - [`core`] - entity metadata, row codec and the [`Storage`] trait
//! - [`paginator`] - paged reads with totals
//! - [`repository`] - the generic repository
//! - [`entities`] - the application's persisted entities
//! - [`container`] - one repository per entity over a shared handle
//! - [`backends`] - backend implementations
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stencil_persistence::backends::sqlite::SqliteBackend;
//! use stencil_persistence::container::RepositoryContainer;
//! use stencil_persistence::entities::{self, Account, Key};
//! use stencil_persistence::query;
//! use stencil_persistence::types::FindOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema(entities::ALL_SCHEMAS)?;
//! let repos = RepositoryContainer::new(Arc::new(backend));
//!
//! let mut account = Account::new("ada@example.com");
//! repos.accounts.create(&mut account).await?;
//! repos
//!     .keys
//!     .create(&mut Key::new(&account.id, "default", "pk_live", "sk_live"))
//!     .await?;
//!
//! let page = repos
//!     .keys
//!     .find_with_pagination(
//!         query::eq("account_id", account.id.as_str()),
//!         &FindOptions::new().with_pagination(1, 20).with_preloads(["account"]),
//!     )
//!     .await?;
//! assert_eq!(page.record_count, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Predicates
//!
//! ```
//! use stencil_persistence::query::{self, build_query_with_operator};
//!
//! let q = query::and([
//!     query::eq("account_id", "a1"),
//!     query::eq("slug", vec!["welcome", "reset"]),
//!     build_query_with_operator("created_at", ">=", "2024-01-01T00:00:00Z"),
//! ]);
//! assert_eq!(
//!     q.fragment(),
//!     "(account_id = ? AND slug IN (?) AND created_at >= ?)"
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod container;
pub mod core;
pub mod entities;
pub mod error;
pub mod paginator;
pub mod query;
pub mod repository;
pub mod types;

mod preload;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use query::{Query, SqlValue};
pub use types::{FindOptions, Page, SortOrder};

// Re-export core traits
pub use core::{Entity, Storage, StorageTransaction};

pub use container::RepositoryContainer;
pub use paginator::Paginator;
pub use repository::Repository;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
