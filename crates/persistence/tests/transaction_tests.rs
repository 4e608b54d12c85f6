//! Transaction integration tests against the SQLite backend.

mod common;

use stencil_persistence::container::RepositoryContainer;
use stencil_persistence::entities::{Account, Key};
use stencil_persistence::error::{StorageError, TransactionError};
use stencil_persistence::repository::{Condition, Repository};
use stencil_persistence::{Storage, query};

use common::{create_account, create_repos};

#[tokio::test]
async fn test_commit_persists_all_writes() {
    let repos = create_repos();

    let account_id = repos
        .accounts
        .transaction(|tx| async move {
            let scoped = RepositoryContainer::new(tx);
            let mut account = Account::new("ada@example.com");
            scoped.accounts.create(&mut account).await?;
            scoped
                .keys
                .create(&mut Key::new(&account.id, "default", "pk", "sk"))
                .await?;
            Ok::<_, StorageError>(account.id)
        })
        .await
        .unwrap();

    let account = repos
        .accounts
        .find_by_field_name_with_preload(query::eq("id", account_id.as_str()), ["keys"])
        .await
        .unwrap();
    assert_eq!(account.keys.len(), 1);
}

#[tokio::test]
async fn test_error_rolls_back_and_is_returned() {
    let repos = create_repos();

    let result: Result<(), StorageError> = repos
        .accounts
        .transaction(|tx| async move {
            let accounts = Repository::<Account>::new(tx);
            accounts
                .create(&mut Account::new("ada@example.com"))
                .await?;
            accounts.get(query::eq("email", "missing@example.com")).await?;
            Ok(())
        })
        .await;
    assert!(result.unwrap_err().is_not_found());

    assert_eq!(repos.accounts.count(Condition::All).await.unwrap(), 0);
}

#[derive(Debug)]
enum ServiceError {
    Storage(StorageError),
    Rejected(&'static str),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Storage(err)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Storage(err) => write!(f, "storage: {}", err),
            ServiceError::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

#[tokio::test]
async fn test_caller_error_type_passes_through() {
    let repos = create_repos();

    let result = repos
        .accounts
        .transaction(|tx| async move {
            let accounts = Repository::<Account>::new(tx);
            accounts
                .create(&mut Account::new("ada@example.com"))
                .await?;
            Err::<(), _>(ServiceError::Rejected("quota exceeded"))
        })
        .await;
    assert!(matches!(result, Err(ServiceError::Rejected("quota exceeded"))));

    assert_eq!(repos.accounts.count(Condition::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nested_transaction_is_rejected() {
    let repos = create_repos();

    let result = repos
        .accounts
        .transaction(|tx| async move {
            let accounts = Repository::<Account>::new(tx);
            accounts
                .transaction(|_inner| async move { Ok::<_, StorageError>(()) })
                .await
        })
        .await;
    assert!(matches!(
        result,
        Err(StorageError::Transaction(TransactionError::NestedNotSupported))
    ));
}

#[tokio::test]
async fn test_transaction_handle_reports_backend() {
    let repos = create_repos();
    let account = create_account(&repos, "ada@example.com").await;

    let name = repos
        .accounts
        .transaction(|tx| async move {
            let found = Repository::<Account>::new(tx.clone())
                .get(query::eq("id", account.id.as_str()))
                .await?;
            assert_eq!(found.email, "ada@example.com");
            Ok::<_, StorageError>(tx.backend_name())
        })
        .await
        .unwrap();
    assert_eq!(name, "sqlite");
}

#[tokio::test]
async fn test_file_database_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stencil.db");

    {
        let backend = stencil_persistence::backends::sqlite::SqliteBackend::open(&path).unwrap();
        backend
            .init_schema(stencil_persistence::entities::ALL_SCHEMAS)
            .unwrap();
        let repos = RepositoryContainer::new(std::sync::Arc::new(backend));
        create_account(&repos, "ada@example.com").await;
    }

    let backend = stencil_persistence::backends::sqlite::SqliteBackend::open(&path).unwrap();
    let repos = RepositoryContainer::new(std::sync::Arc::new(backend));
    let found = repos
        .accounts
        .get(query::eq("email", "ada@example.com"))
        .await
        .unwrap();
    assert!(!found.id.is_empty());
}
