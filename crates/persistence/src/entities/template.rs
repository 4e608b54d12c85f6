//! Message templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Column, ColumnType, Entity, Relation, RelationKind, TableSchema};

use super::{Account, assign_identity, touch_if_unset};

pub(super) static SCHEMA: TableSchema = TableSchema {
    name: "templates",
    columns: &[
        Column::new("id", ColumnType::Text),
        Column::new("account_id", ColumnType::Text),
        Column::new("name", ColumnType::Text),
        Column::new("slug", ColumnType::Text),
        Column::new("version", ColumnType::Text),
        Column::new("location", ColumnType::Text),
        Column::new("content_type", ColumnType::Text),
        Column::new("active", ColumnType::Boolean),
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
    soft_delete: None,
};

/// A stored template. Several versions may share one slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// UUID, assigned on create.
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Display name.
    pub name: String,
    /// Stable identifier shared by every version.
    pub slug: String,
    /// Version label.
    pub version: String,
    /// Where the template body lives.
    pub location: String,
    /// MIME type of the body.
    pub content_type: String,
    /// Whether this version is served.
    pub active: bool,
    /// Creation time, assigned on create.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Retirement time.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Owner; populated by preloading `account`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Box<Account>>,
}

impl Template {
    /// Creates an active first version.
    pub fn new(
        account_id: impl Into<String>,
        name: impl Into<String>,
        slug: impl Into<String>,
        location: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            slug: slug.into(),
            version: "1".to_string(),
            location: location.into(),
            content_type: content_type.into(),
            active: true,
            ..Default::default()
        }
    }
}

impl Entity for Template {
    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn before_create(&mut self) {
        assign_identity(&mut self.id, &mut self.created_at);
        touch_if_unset(&mut self.updated_at);
        if self.version.is_empty() {
            self.version = "1".to_string();
        }
    }

    fn before_update(&mut self) {
        self.updated_at = Utc::now();
    }
}
