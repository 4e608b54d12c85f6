//! Login sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};

use super::{Account, assign_identity, touch_if_unset};

pub(super) static SCHEMA: TableSchema = TableSchema {
    name: "sessions",
    columns: &[
        Column::new("id", ColumnType::Text),
        Column::new("account_id", ColumnType::Text),
        Column::new("device", ColumnType::Json).nullable(),
        Column::new("token", ColumnType::Text),
        Column::new("expires_at", ColumnType::Timestamp),
        Column::new("last_active", ColumnType::Timestamp),
        Column::new("created_at", ColumnType::Timestamp),
        Column::new("deleted_at", ColumnType::Timestamp).nullable(),
    ],
    primary_key: "id",
    relations: &[Relation {
        name: "account",
        kind: RelationKind::BelongsTo,
        foreign_key: "account_id",
        references: "id",
        target: Account::schema,
    }],
    soft_delete: Some("deleted_at"),
};

/// Client fingerprint recorded at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Remote address.
    pub ip: String,
    /// Raw User-Agent header.
    pub user_agent: String,
    /// Browser name.
    pub browser: String,
    /// Browser version.
    pub browser_version: String,
    /// Operating system.
    pub os: String,
    /// Operating system version.
    pub os_version: String,
}

/// An issued session token. Deletion is soft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// UUID, assigned on create.
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Client fingerprint.
    pub device: Device,
    /// Signed token.
    pub token: String,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Last request seen; defaults to creation time.
    pub last_active: DateTime<Utc>,
    /// Creation time, assigned on create.
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Owner; populated by preloading `account`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Box<Account>>,
}

impl Session {
    /// Creates a session for an account.
    pub fn new(
        account_id: impl Into<String>,
        device: Device,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            device,
            token: token.into(),
            expires_at,
            ..Default::default()
        }
    }

    /// Returns true once `expires_at` has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl Entity for Session {
    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn before_create(&mut self) {
        assign_identity(&mut self.id, &mut self.created_at);
        touch_if_unset(&mut self.last_active);
    }
}
