//! SQL rendering and execution for the SQLite backend.
//!
//! Rendering is pure: each statement becomes SQL text plus a flat list of
//! bind values. Execution functions take a plain [`Connection`] so pooled
//! connections and transaction connections share one code path.

use chrono::Utc;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, Row, params_from_iter};
use serde_json::Value as JsonValue;

use crate::core::{Record, SelectStatement, TableSchema};
use crate::error::{QueryError, StorageError, StorageResult};
use crate::query::{Query, QueryArg, SqlValue, split_placeholders};
use crate::types::{ConflictAction, OnConflict};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Timestamp(ts) => {
                ToSqlOutput::Owned(Value::Text(SqlValue::format_timestamp(ts)))
            }
            SqlValue::Decimal(d) => ToSqlOutput::Owned(Value::Text(d.to_string())),
            SqlValue::Json(v) => ToSqlOutput::Owned(Value::Text(v.to_string())),
        };
        Ok(output)
    }
}

/// Rendered SQL with its bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rendered {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Lists longer than this bind as one JSON array read through `json_each`.
const INLINE_LIST_LIMIT: usize = 256;

/// SQLITE_MAX_VARIABLE_NUMBER of the bundled library.
const MAX_BINDS: usize = 32766;

/// Expands a fragment so every bind value has its own `?`.
///
/// A list argument becomes `?, ?, ...`; an empty list becomes `NULL`, so
/// `IN (?)` over no values matches nothing. Long lists become a single
/// JSON array bind, which keeps the statement under the variable limit.
pub(crate) fn expand(fragment: &str, args: &[QueryArg]) -> StorageResult<(String, Vec<SqlValue>)> {
    let pieces = split_placeholders(fragment);
    let placeholders = pieces.len() - 1;
    if placeholders != args.len() {
        return Err(QueryError::PlaceholderMismatch {
            fragment: fragment.to_string(),
            placeholders,
            args: args.len(),
        }
        .into());
    }

    let mut sql = String::with_capacity(fragment.len());
    let mut params = Vec::with_capacity(args.len());
    let mut pieces = pieces.into_iter();
    if let Some(first) = pieces.next() {
        sql.push_str(first);
    }
    for (arg, piece) in args.iter().zip(pieces) {
        match arg {
            QueryArg::Value(value) => {
                sql.push('?');
                params.push(value.clone());
            }
            QueryArg::List(values) if values.is_empty() => sql.push_str("NULL"),
            QueryArg::List(values) if values.len() > INLINE_LIST_LIMIT => {
                sql.push_str("SELECT value FROM json_each(?)");
                params.push(SqlValue::Json(JsonValue::Array(
                    values.iter().map(SqlValue::to_json).collect(),
                )));
            }
            QueryArg::List(values) => {
                sql.push_str(&vec!["?"; values.len()].join(", "));
                params.extend(values.iter().cloned());
            }
        }
        sql.push_str(piece);
    }
    Ok((sql, params))
}

fn filter_clauses(
    table: &str,
    schema: &TableSchema,
    filter: &Query,
    params: &mut Vec<SqlValue>,
) -> StorageResult<Vec<String>> {
    let mut clauses = Vec::new();
    if !filter.is_empty() {
        let (sql, args) = expand(filter.fragment(), filter.args())?;
        clauses.push(format!("({})", sql));
        params.extend(args);
    }
    if let Some(column) = schema.soft_delete {
        clauses.push(format!("{}.{} IS NULL", quote(table), quote(column)));
    }
    Ok(clauses)
}

fn table_source(statement: &SelectStatement, params: &mut Vec<SqlValue>) -> StorageResult<String> {
    let table = statement.table_name();

    let columns = if statement.columns.is_empty() {
        format!("{}.*", quote(table))
    } else {
        statement.columns.join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", columns, quote(table));

    for join in &statement.joins {
        let (clause, args) = expand(&join.clause, &join.args)?;
        sql.push(' ');
        sql.push_str(&clause);
        params.extend(args);
    }

    let clauses = filter_clauses(table, statement.schema, &statement.filter, params)?;
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !statement.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&statement.group_by.join(", "));
    }
    Ok(sql)
}

fn raw_source(raw: &Query, filter: &Query, params: &mut Vec<SqlValue>) -> StorageResult<String> {
    let (inner, args) = expand(raw.fragment(), raw.args())?;
    params.extend(args);
    let mut sql = format!("SELECT * FROM ({}) AS raw_rows", inner);

    if !filter.is_empty() {
        let (clause, args) = expand(filter.fragment(), filter.args())?;
        sql.push_str(&format!(" WHERE ({})", clause));
        params.extend(args);
    }
    Ok(sql)
}

pub(crate) fn render_select(statement: &SelectStatement) -> StorageResult<Rendered> {
    let mut params = Vec::new();
    let mut sql = match &statement.raw {
        Some(raw) => raw_source(raw, &statement.filter, &mut params)?,
        None => table_source(statement, &mut params)?,
    };

    if !statement.order_by.is_empty() {
        let terms: Vec<String> = statement
            .order_by
            .iter()
            .map(|o| {
                let nulls = if o.nulls_last { " NULLS LAST" } else { "" };
                format!("{} {}{}", o.field, o.order.as_sql(), nulls)
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    match (statement.limit, statement.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }

    Ok(Rendered { sql, params })
}

pub(crate) fn render_count(statement: &SelectStatement) -> StorageResult<Rendered> {
    let inner = render_select(&statement.for_count())?;
    Ok(Rendered {
        sql: format!("SELECT COUNT(*) FROM ({}) AS counted", inner.sql),
        params: inner.params,
    })
}

pub(crate) fn render_insert(
    schema: &TableSchema,
    records: &[Record],
    on_conflict: Option<&OnConflict>,
) -> Rendered {
    let columns: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
    let row = format!("({})", vec!["?"; columns.len()].join(", "));

    let mut params = Vec::with_capacity(records.len() * columns.len());
    for record in records {
        for column in &columns {
            params.push(record.get(*column).cloned().unwrap_or(SqlValue::Null));
        }
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote(schema.name),
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
        vec![row; records.len()].join(", ")
    );

    if let Some(conflict) = on_conflict {
        let target: Vec<String> = if conflict.target.is_empty() {
            vec![schema.primary_key.to_string()]
        } else {
            conflict.target.clone()
        };
        let updated: Vec<String> = match &conflict.action {
            ConflictAction::DoNothing => Vec::new(),
            ConflictAction::UpdateAll => columns
                .iter()
                .filter(|c| **c != schema.primary_key && !target.iter().any(|t| t == *c))
                .map(|c| c.to_string())
                .collect(),
            ConflictAction::UpdateColumns(list) => list.clone(),
        };

        sql.push_str(&format!(
            " ON CONFLICT ({})",
            target.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
        ));
        if updated.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            let assignments: Vec<String> = updated
                .iter()
                .map(|c| format!("{} = excluded.{}", quote(c), quote(c)))
                .collect();
            sql.push_str(&format!(" DO UPDATE SET {}", assignments.join(", ")));
        }
    }

    Rendered { sql, params }
}

fn require_filter(schema: &TableSchema, filter: &Query, operation: &str) -> StorageResult<()> {
    if filter.is_empty() {
        return Err(QueryError::MissingWhereConditions {
            table: schema.name.to_string(),
            operation: operation.to_string(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn render_update(
    schema: &TableSchema,
    filter: &Query,
    changes: &Record,
) -> StorageResult<Rendered> {
    require_filter(schema, filter, "update")?;

    let mut params: Vec<SqlValue> = Vec::with_capacity(changes.len());
    let assignments: Vec<String> = changes
        .iter()
        .map(|(column, value)| {
            params.push(value.clone());
            format!("{} = ?", quote(column))
        })
        .collect();

    let clauses = filter_clauses(schema.name, schema, filter, &mut params)?;
    Ok(Rendered {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            quote(schema.name),
            assignments.join(", "),
            clauses.join(" AND ")
        ),
        params,
    })
}

pub(crate) fn render_delete(schema: &TableSchema, filter: &Query) -> StorageResult<Rendered> {
    require_filter(schema, filter, "delete")?;

    match schema.soft_delete {
        Some(column) => {
            let mut params = vec![SqlValue::Timestamp(Utc::now())];
            let clauses = filter_clauses(schema.name, schema, filter, &mut params)?;
            Ok(Rendered {
                sql: format!(
                    "UPDATE {} SET {} = ? WHERE {}",
                    quote(schema.name),
                    quote(column),
                    clauses.join(" AND ")
                ),
                params,
            })
        }
        None => {
            let (sql, params) = expand(filter.fragment(), filter.args())?;
            Ok(Rendered {
                sql: format!("DELETE FROM {} WHERE ({})", quote(schema.name), sql),
                params,
            })
        }
    }
}

fn read_row(row: &Row<'_>, names: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(n) => SqlValue::Integer(n),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        };
        record.insert(name.clone(), value);
    }
    Ok(record)
}

fn execute(conn: &Connection, rendered: &Rendered) -> StorageResult<u64> {
    tracing::debug!(sql = %rendered.sql, binds = rendered.params.len(), "Executing statement");
    let affected = conn.execute(&rendered.sql, params_from_iter(rendered.params.iter()))?;
    Ok(affected as u64)
}

pub(crate) fn insert(
    conn: &Connection,
    schema: &TableSchema,
    records: &[Record],
    on_conflict: Option<&OnConflict>,
) -> StorageResult<u64> {
    if records.is_empty() {
        return Ok(0);
    }
    let rows_per_statement = (MAX_BINDS / schema.columns.len().max(1)).max(1);
    if records.len() <= rows_per_statement {
        return execute(conn, &render_insert(schema, records, on_conflict));
    }

    // Batches commit or fail together.
    conn.execute_batch("SAVEPOINT bulk_insert")?;
    let written = records
        .chunks(rows_per_statement)
        .try_fold(0u64, |total, batch| {
            let rendered = render_insert(schema, batch, on_conflict);
            Ok::<_, StorageError>(total + execute(conn, &rendered)?)
        });
    match written {
        Ok(total) => {
            conn.execute_batch("RELEASE bulk_insert")?;
            Ok(total)
        }
        Err(err) => {
            if let Err(e) = conn.execute_batch("ROLLBACK TO bulk_insert; RELEASE bulk_insert") {
                tracing::warn!(error = %e, table = schema.name, "Failed to roll back bulk insert");
            }
            Err(err)
        }
    }
}

pub(crate) fn fetch(conn: &Connection, statement: &SelectStatement) -> StorageResult<Vec<Record>> {
    let rendered = render_select(statement)?;
    tracing::debug!(sql = %rendered.sql, binds = rendered.params.len(), "Executing query");

    let mut prepared = conn.prepare(&rendered.sql)?;
    let names: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let rows = prepared.query_map(params_from_iter(rendered.params.iter()), |row| {
        read_row(row, &names)
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

pub(crate) fn count(conn: &Connection, statement: &SelectStatement) -> StorageResult<u64> {
    let rendered = render_count(statement)?;
    tracing::debug!(sql = %rendered.sql, binds = rendered.params.len(), "Executing count");

    let count: i64 = conn.query_row(
        &rendered.sql,
        params_from_iter(rendered.params.iter()),
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub(crate) fn update(
    conn: &Connection,
    schema: &TableSchema,
    filter: &Query,
    changes: &Record,
) -> StorageResult<u64> {
    require_filter(schema, filter, "update")?;
    if changes.is_empty() {
        return Ok(0);
    }
    execute(conn, &render_update(schema, filter, changes)?)
}

pub(crate) fn delete(conn: &Connection, schema: &TableSchema, filter: &Query) -> StorageResult<u64> {
    execute(conn, &render_delete(schema, filter)?)
}
