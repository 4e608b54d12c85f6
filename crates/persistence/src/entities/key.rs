//! API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};

use super::{Account, assign_identity};

pub(super) static SCHEMA: TableSchema = TableSchema {
    name: "keys",
    columns: &[
        Column::new("id", ColumnType::Text),
        Column::new("account_id", ColumnType::Text),
        Column::new("name", ColumnType::Text),
        Column::new("public", ColumnType::Text),
        Column::new("private", ColumnType::Text),
        Column::new("created_at", ColumnType::Timestamp),
    ],
    primary_key: "id",
    relations: &[Relation {
        name: "account",
        kind: RelationKind::BelongsTo,
        foreign_key: "account_id",
        references: "id",
        target: Account::schema,
    }],
    soft_delete: None,
};

/// A public/private key pair owned by an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// UUID, assigned on create.
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Display name.
    pub name: String,
    /// Public half, used to identify API callers.
    pub public: String,
    /// Private half.
    pub private: String,
    /// Creation time, assigned on create.
    pub created_at: DateTime<Utc>,

    /// Owner; populated by preloading `account`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Box<Account>>,
}

impl Key {
    /// Creates a key for an account.
    pub fn new(
        account_id: impl Into<String>,
        name: impl Into<String>,
        public: impl Into<String>,
        private: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            public: public.into(),
            private: private.into(),
            ..Default::default()
        }
    }
}

impl Entity for Key {
    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn before_create(&mut self) {
        assign_identity(&mut self.id, &mut self.created_at);
    }
}
