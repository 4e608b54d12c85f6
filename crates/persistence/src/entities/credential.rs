//! Delivery-platform credentials.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};

use super::{Account, assign_identity, touch_if_unset};

pub(super) static SCHEMA: TableSchema = TableSchema {
    name: "credentials",
    columns: &[
        Column::new("id", ColumnType::Text),
        Column::new("account_id", ColumnType::Text),
        Column::new("platform", ColumnType::Text),
        Column::new("type", ColumnType::Text),
        Column::new("is_active", ColumnType::Integer),
        Column::new("meta", ColumnType::Json),
        Column::new("created_at", ColumnType::Timestamp),
        Column::new("updated_at", ColumnType::Timestamp),
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

/// Delivery provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Mailjet.
    #[default]
    Mailjet,
    /// Mailgun.
    Mailgun,
}

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    /// Email.
    #[default]
    Email,
    /// SMS.
    Sms,
    /// Push notification.
    Push,
}

/// Provider credentials for one account. Deletion is soft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// UUID, assigned on create.
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Provider.
    pub platform: Platform,
    /// Channel.
    #[serde(rename = "type")]
    pub kind: PlatformType,
    /// 1 when in use.
    pub is_active: i64,
    /// Provider-specific settings such as API keys and sender names.
    pub meta: BTreeMap<String, Value>,
    /// Creation time, assigned on create.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Owner; populated by preloading `account`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Box<Account>>,
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            id: String::new(),
            account_id: String::new(),
            platform: Platform::default(),
            kind: PlatformType::default(),
            is_active: 1,
            meta: BTreeMap::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            deleted_at: None,
            account: None,
        }
    }
}

impl Credential {
    /// Creates active credentials.
    pub fn new(
        account_id: impl Into<String>,
        platform: Platform,
        kind: PlatformType,
        meta: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            platform,
            kind,
            meta,
            ..Default::default()
        }
    }

    /// Returns a string setting from `meta`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}

impl Entity for Credential {
    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn before_create(&mut self) {
        assign_identity(&mut self.id, &mut self.created_at);
        touch_if_unset(&mut self.updated_at);
    }

    fn before_update(&mut self) {
        self.updated_at = Utc::now();
    }
}
