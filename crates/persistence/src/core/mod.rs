//! Core traits and abstractions.
//!
//! - [`Entity`], [`TableSchema`] - how a type maps onto a table
//! - [`Storage`], [`StorageTransaction`] - the storage handle contract
//! - [`SelectStatement`] - a backend-neutral read
//! - [`codec`] - entity to row conversion
//!
//! # Example: Implementing a Storage Backend
//!
//! ```ignore
//! use async_trait::async_trait;
//! use stencil_persistence::core::{Record, SelectStatement, Storage, TableSchema};
//! use stencil_persistence::error::StorageResult;
//!
//! struct MyBackend {
//!     // ... backend-specific fields
//! }
//!
//! #[async_trait]
//! impl Storage for MyBackend {
//!     fn backend_name(&self) -> &'static str {
//!         "my-backend"
//!     }
//!
//!     async fn fetch(&self, statement: &SelectStatement) -> StorageResult<Vec<Record>> {
//!         // Implementation...
//!         todo!()
//!     }
//!
//!     // ... implement other required methods
//! }
//! ```

pub mod codec;
pub mod entity;
pub mod storage;

pub use codec::Record;
pub use entity::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};
pub use storage::{Join, OrderBy, SelectStatement, Storage, StorageTransaction};
