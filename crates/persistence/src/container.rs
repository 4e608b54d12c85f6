//! Per-entity repositories over one storage handle.

use std::sync::Arc;

use crate::core::Storage;
use crate::entities::{Account, Credential, Key, Session, Template};
use crate::repository::Repository;

/// The repositories the application services are built on.
///
/// ```no_run
/// use std::sync::Arc;
/// use stencil_persistence::backends::sqlite::SqliteBackend;
/// use stencil_persistence::container::RepositoryContainer;
/// use stencil_persistence::entities;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = SqliteBackend::open("./data/stencil.db")?;
/// backend.init_schema(entities::ALL_SCHEMAS)?;
///
/// let repos = RepositoryContainer::new(Arc::new(backend));
/// let _accounts = repos.accounts.clone();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryContainer {
    /// Accounts.
    pub accounts: Repository<Account>,
    /// API keys.
    pub keys: Repository<Key>,
    /// Templates.
    pub templates: Repository<Template>,
    /// Delivery credentials.
    pub credentials: Repository<Credential>,
    /// Login sessions.
    pub sessions: Repository<Session>,
}

impl RepositoryContainer {
    /// Builds every repository on `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            accounts: Repository::new(Arc::clone(&storage)),
            keys: Repository::new(Arc::clone(&storage)),
            templates: Repository::new(Arc::clone(&storage)),
            credentials: Repository::new(Arc::clone(&storage)),
            sessions: Repository::new(storage),
        }
    }

    /// Rebinds every repository to another handle, such as a transaction.
    pub fn with_storage(&self, storage: Arc<dyn Storage>) -> Self {
        Self::new(storage)
    }
}
