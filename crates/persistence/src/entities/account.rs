//! Accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};

use super::{Key, assign_identity};

pub(super) static SCHEMA: TableSchema = TableSchema {
    name: "accounts",
    columns: &[
        Column::new("id", ColumnType::Text),
        Column::new("email", ColumnType::Text).unique(),
        Column::new("hash_salt", ColumnType::Text),
        Column::new("hashed_password", ColumnType::Text),
        Column::new("verified_at", ColumnType::Timestamp).nullable(),
        Column::new("created_at", ColumnType::Timestamp),
        Column::new("updated_at", ColumnType::Timestamp).nullable(),
    ],
    primary_key: "id",
    relations: &[Relation {
        name: "keys",
        kind: RelationKind::HasMany,
        foreign_key: "account_id",
        references: "id",
        target: Key::schema,
    }],
    soft_delete: None,
};

/// A registered user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// UUID, assigned on create.
    pub id: String,
    /// Login email; unique.
    pub email: String,
    /// Salt prepended to the password before hashing.
    pub hash_salt: String,
    /// Password hash.
    pub hashed_password: String,
    /// When the email was verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Creation time, assigned on create.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,

    /// API keys; populated by preloading `keys`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
}

impl Account {
    /// Creates an unverified account.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    /// Returns true once the email is verified.
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

impl Entity for Account {
    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn before_create(&mut self) {
        assign_identity(&mut self.id, &mut self.created_at);
    }

    fn before_update(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
