//! Entity contract and table metadata.
//!
//! An [`Entity`] is any serde type that also describes its table through a
//! static [`TableSchema`]. The schema drives row encoding, soft deletion,
//! primary-key lookups and relation preloading.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Real,
    /// Boolean, stored as 0/1.
    Boolean,
    /// UTC timestamp, stored as fixed-width RFC 3339 text.
    Timestamp,
    /// JSON document, stored as text.
    Json,
    /// Exact decimal, stored as text.
    Decimal,
}

impl ColumnType {
    /// SQL type name used in DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Timestamp | ColumnType::Json | ColumnType::Decimal => {
                "TEXT"
            }
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name; also the serde field name.
    pub name: &'static str,
    /// Storage type.
    pub kind: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether values must be unique.
    pub unique: bool,
}

impl Column {
    /// A non-null, non-unique column.
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
        }
    }

    /// Allows NULL.
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Adds a unique constraint.
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This row holds the foreign key; loads a single target or null.
    BelongsTo,
    /// The target holds the foreign key; loads a single target or null.
    HasOne,
    /// The target holds the foreign key; loads a list.
    HasMany,
}

/// A preloadable association.
///
/// For [`RelationKind::BelongsTo`], `foreign_key` is a column of this table
/// and `references` a column of the target. For the `Has*` kinds,
/// `foreign_key` is a column of the target and `references` a column of
/// this table.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Name of the serde field the loaded rows are attached to.
    pub name: &'static str,
    /// Cardinality.
    pub kind: RelationKind,
    /// Foreign-key column.
    pub foreign_key: &'static str,
    /// Referenced column.
    pub references: &'static str,
    /// Schema of the related table.
    pub target: fn() -> &'static TableSchema,
}

impl Relation {
    /// Column of this table whose values select the related rows.
    pub fn local_key(&self) -> &'static str {
        match self.kind {
            RelationKind::BelongsTo => self.foreign_key,
            RelationKind::HasOne | RelationKind::HasMany => self.references,
        }
    }

    /// Column of the target table matched against [`Relation::local_key`].
    pub fn remote_key(&self) -> &'static str {
        match self.kind {
            RelationKind::BelongsTo => self.references,
            RelationKind::HasOne | RelationKind::HasMany => self.foreign_key,
        }
    }
}

/// Static description of a table.
#[derive(Debug)]
pub struct TableSchema {
    /// Table name.
    pub name: &'static str,
    /// Columns, in DDL order.
    pub columns: &'static [Column],
    /// Primary-key column.
    pub primary_key: &'static str,
    /// Preloadable relations.
    pub relations: &'static [Relation],
    /// Soft-delete marker column, if rows are never physically removed.
    pub soft_delete: Option<&'static str>,
}

impl TableSchema {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Returns `table.column`.
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.name, column)
    }
}

/// A type persisted in one table.
///
/// Field names must match column names. Relation fields should carry
/// `#[serde(default)]` so rows decode when the relation is not preloaded.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The table this entity lives in.
    fn schema() -> &'static TableSchema;

    /// Called before insert. Assign generated keys and timestamps here.
    fn before_create(&mut self) {}

    /// Called before a partial update.
    fn before_update(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    static PARENT_COLUMNS: &[Column] = &[
        Column::new("id", ColumnType::Text),
        Column::new("email", ColumnType::Text).unique(),
        Column::new("verified_at", ColumnType::Timestamp).nullable(),
    ];

    static PARENT: TableSchema = TableSchema {
        name: "parents",
        columns: PARENT_COLUMNS,
        primary_key: "id",
        relations: &[Relation {
            name: "children",
            kind: RelationKind::HasMany,
            foreign_key: "parent_id",
            references: "id",
            target: child_schema,
        }],
        soft_delete: None,
    };

    static CHILD: TableSchema = TableSchema {
        name: "children",
        columns: &[
            Column::new("id", ColumnType::Text),
            Column::new("parent_id", ColumnType::Text),
        ],
        primary_key: "id",
        relations: &[Relation {
            name: "parent",
            kind: RelationKind::BelongsTo,
            foreign_key: "parent_id",
            references: "id",
            target: parent_schema,
        }],
        soft_delete: None,
    };

    fn parent_schema() -> &'static TableSchema {
        &PARENT
    }

    fn child_schema() -> &'static TableSchema {
        &CHILD
    }

    #[test]
    fn test_column_builders() {
        let email = PARENT.column("email").unwrap();
        assert!(email.unique);
        assert!(!email.nullable);
        assert!(PARENT.column("verified_at").unwrap().nullable);
        assert!(PARENT.column("missing").is_none());
    }

    #[test]
    fn test_relation_keys() {
        let children = PARENT.relation("children").unwrap();
        assert_eq!(children.local_key(), "id");
        assert_eq!(children.remote_key(), "parent_id");
        assert_eq!((children.target)().name, "children");

        let parent = CHILD.relation("parent").unwrap();
        assert_eq!(parent.local_key(), "parent_id");
        assert_eq!(parent.remote_key(), "id");
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(ColumnType::Boolean.sql_type(), "INTEGER");
        assert_eq!(ColumnType::Timestamp.sql_type(), "TEXT");
        assert_eq!(PARENT.qualified("id"), "parents.id");
    }
}
