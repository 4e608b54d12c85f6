//! SQLite DDL generated from table schemas.

use rusqlite::Connection;

use crate::core::{RelationKind, TableSchema};
use crate::error::StorageResult;

use super::sql::quote;

/// Renders `CREATE TABLE IF NOT EXISTS` for one table.
///
/// Belongs-to relations become foreign keys.
pub(crate) fn create_table_sql(schema: &TableSchema) -> String {
    let mut definitions: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let mut definition = format!("{} {}", quote(column.name), column.kind.sql_type());
            if column.name == schema.primary_key {
                definition.push_str(" NOT NULL PRIMARY KEY");
            } else {
                if !column.nullable {
                    definition.push_str(" NOT NULL");
                }
                if column.unique {
                    definition.push_str(" UNIQUE");
                }
            }
            definition
        })
        .collect();

    for relation in schema
        .relations
        .iter()
        .filter(|r| r.kind == RelationKind::BelongsTo)
    {
        definitions.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote(relation.foreign_key),
            quote((relation.target)().name),
            quote(relation.references)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(schema.name),
        definitions.join(",\n    ")
    )
}

/// Renders the secondary indexes for one table: foreign keys and the
/// soft-delete marker.
pub(crate) fn create_index_sql(schema: &TableSchema) -> Vec<String> {
    let mut columns: Vec<&str> = schema
        .relations
        .iter()
        .filter(|r| r.kind == RelationKind::BelongsTo)
        .map(|r| r.foreign_key)
        .collect();
    columns.extend(schema.soft_delete);
    columns.dedup();

    columns
        .into_iter()
        .map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(&format!("idx_{}_{}", schema.name, column)),
                quote(schema.name),
                quote(column)
            )
        })
        .collect()
}

/// Creates every table and index that does not exist yet.
///
/// Tables are created in slice order, so referenced tables must come first.
pub(crate) fn initialize_schema(conn: &Connection, schemas: &[&TableSchema]) -> StorageResult<()> {
    for schema in schemas {
        conn.execute_batch(&create_table_sql(schema))?;
        for index in create_index_sql(schema) {
            conn.execute_batch(&index)?;
        }
        tracing::debug!(table = schema.name, "Ensured table");
    }
    Ok(())
}
