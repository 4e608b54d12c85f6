//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use stencil_persistence::backends::sqlite::SqliteBackend;
use stencil_persistence::container::RepositoryContainer;
use stencil_persistence::entities::{self, Account, Key, Template};

pub fn create_backend() -> Arc<SqliteBackend> {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend
        .init_schema(entities::ALL_SCHEMAS)
        .expect("Failed to initialize schema");
    Arc::new(backend)
}

pub fn create_repos() -> RepositoryContainer {
    RepositoryContainer::new(create_backend())
}

pub async fn create_account(repos: &RepositoryContainer, email: &str) -> Account {
    let mut account = Account::new(email);
    account.hash_salt = "salt".to_string();
    account.hashed_password = "hashed".to_string();
    repos
        .accounts
        .create(&mut account)
        .await
        .expect("Failed to create account");
    account
}

pub async fn create_key(repos: &RepositoryContainer, account: &Account, name: &str) -> Key {
    let mut key = Key::new(
        &account.id,
        name,
        format!("pk_{}", name),
        format!("sk_{}", name),
    );
    repos.keys.create(&mut key).await.expect("Failed to create key");
    key
}

pub async fn create_template(
    repos: &RepositoryContainer,
    account: &Account,
    name: &str,
    slug: &str,
) -> Template {
    let mut template = Template::new(
        &account.id,
        name,
        slug,
        format!("templates/{}.html", slug),
        "text/html",
    );
    repos
        .templates
        .create(&mut template)
        .await
        .expect("Failed to create template");
    template
}
