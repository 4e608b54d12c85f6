//! Conversion between entities and storage rows.
//!
//! Entities travel through `serde_json`: encoding serializes the entity and
//! picks out the schema's columns, converting each by its [`ColumnType`];
//! decoding rebuilds a JSON object from a row so relation data can be
//! attached before the final deserialization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::SqlValue;

use super::entity::{Column, ColumnType, Entity, TableSchema};

/// A row keyed by column name.
pub type Record = BTreeMap<String, SqlValue>;

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

/// Encodes an entity into a row holding every schema column.
pub fn encode<T: Entity>(entity: &T) -> StorageResult<Record> {
    let schema = T::schema();
    let value = serde_json::to_value(entity)?;
    let Value::Object(object) = value else {
        return Err(serialization_error(format!(
            "{} did not serialize to an object",
            schema.name
        )));
    };

    let mut record = Record::new();
    for column in schema.columns {
        let field = object.get(column.name).unwrap_or(&Value::Null);
        record.insert(column.name.to_string(), encode_value(column, field)?);
    }
    Ok(record)
}

/// Converts one JSON field into the bind value for its column.
pub fn encode_value(column: &Column, value: &Value) -> StorageResult<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let mismatch = || {
        serialization_error(format!(
            "column {} expects {:?}, got {}",
            column.name, column.kind, value
        ))
    };

    let encoded = match column.kind {
        ColumnType::Text => match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        },
        ColumnType::Integer => match value {
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => SqlValue::Integer(n.as_i64().ok_or_else(mismatch)?),
            _ => return Err(mismatch()),
        },
        ColumnType::Real => SqlValue::Real(value.as_f64().ok_or_else(mismatch)?),
        ColumnType::Boolean => match value {
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => SqlValue::Bool(n.as_i64().is_some_and(|i| i != 0)),
            _ => return Err(mismatch()),
        },
        ColumnType::Timestamp => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let ts = DateTime::parse_from_rfc3339(text)
                .map_err(|e| serialization_error(format!("column {}: {}", column.name, e)))?;
            SqlValue::Timestamp(ts.with_timezone(&Utc))
        }
        ColumnType::Json => SqlValue::Json(value.clone()),
        ColumnType::Decimal => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(mismatch()),
            };
            let decimal = text
                .parse::<Decimal>()
                .map_err(|e| serialization_error(format!("column {}: {}", column.name, e)))?;
            SqlValue::Decimal(decimal)
        }
    };
    Ok(encoded)
}

/// Rebuilds a JSON object from a row, typed by the schema.
///
/// Columns missing from the schema (joins, computed selects) are passed
/// through by their stored type.
pub fn decode_row(schema: &TableSchema, record: &Record) -> StorageResult<Map<String, Value>> {
    let mut object = Map::new();
    for (name, value) in record {
        let json = match schema.column(name) {
            Some(column) => decode_value(column, value)?,
            None => value.to_json(),
        };
        object.insert(name.clone(), json);
    }
    Ok(object)
}

/// Converts a stored value back into the JSON shape serde expects.
pub fn decode_value(column: &Column, value: &SqlValue) -> StorageResult<Value> {
    let decoded = match (column.kind, value) {
        (_, SqlValue::Null) => Value::Null,
        (ColumnType::Boolean, SqlValue::Integer(i)) => Value::Bool(*i != 0),
        (ColumnType::Json, SqlValue::Text(text)) => serde_json::from_str(text)?,
        (ColumnType::Real, SqlValue::Integer(i)) => Value::from(*i as f64),
        (_, other) => other.to_json(),
    };
    Ok(decoded)
}

/// Deserializes an entity from a decoded row.
pub fn from_object<T: Entity>(object: Map<String, Value>) -> StorageResult<T> {
    serde_json::from_value(Value::Object(object)).map_err(|e| {
        serialization_error(format!("failed to decode {}: {}", T::schema().name, e))
    })
}

/// Decodes a row straight into an entity.
pub fn decode<T: Entity>(record: &Record) -> StorageResult<T> {
    from_object(decode_row(T::schema(), record)?)
}

/// Extracts the primary-key value of an entity.
pub fn primary_key<T: Entity>(entity: &T) -> StorageResult<SqlValue> {
    let schema = T::schema();
    let record = encode(entity)?;
    Ok(record
        .get(schema.primary_key)
        .cloned()
        .unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{Column, ColumnType, TableSchema};
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    static WIDGET: TableSchema = TableSchema {
        name: "widgets",
        columns: &[
            Column::new("id", ColumnType::Text),
            Column::new("active", ColumnType::Boolean),
            Column::new("count", ColumnType::Integer),
            Column::new("ratio", ColumnType::Real),
            Column::new("meta", ColumnType::Json),
            Column::new("price", ColumnType::Decimal),
            Column::new("created_at", ColumnType::Timestamp),
            Column::new("deleted_at", ColumnType::Timestamp).nullable(),
        ],
        primary_key: "id",
        relations: &[],
        soft_delete: None,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        active: bool,
        count: i64,
        ratio: f64,
        meta: BTreeMap<String, String>,
        price: Decimal,
        created_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing)]
        extra: Option<String>,
    }

    impl Entity for Widget {
        fn schema() -> &'static TableSchema {
            &WIDGET
        }
    }

    fn widget() -> Widget {
        Widget {
            id: "w1".to_string(),
            active: true,
            count: 3,
            ratio: 0.5,
            meta: BTreeMap::from([("k".to_string(), "v".to_string())]),
            price: Decimal::new(1999, 2),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            deleted_at: None,
            extra: None,
        }
    }

    #[test]
    fn test_encode_types_columns() {
        let record = encode(&widget()).unwrap();
        assert_eq!(record.len(), WIDGET.columns.len());
        assert_eq!(record["active"], SqlValue::Bool(true));
        assert_eq!(record["count"], SqlValue::Integer(3));
        assert_eq!(record["price"], SqlValue::Decimal(Decimal::new(1999, 2)));
        assert_eq!(record["deleted_at"], SqlValue::Null);
        assert!(matches!(record["created_at"], SqlValue::Timestamp(_)));
        assert_eq!(record["meta"], SqlValue::Json(json!({"k": "v"})));
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn test_decode_stored_shapes() {
        // Values as the SQLite driver hands them back.
        let mut record = Record::new();
        record.insert("id".to_string(), SqlValue::Text("w1".to_string()));
        record.insert("active".to_string(), SqlValue::Integer(1));
        record.insert("count".to_string(), SqlValue::Integer(3));
        record.insert("ratio".to_string(), SqlValue::Real(0.5));
        record.insert("meta".to_string(), SqlValue::Text(r#"{"k":"v"}"#.to_string()));
        record.insert("price".to_string(), SqlValue::Text("19.99".to_string()));
        record.insert(
            "created_at".to_string(),
            SqlValue::Text("2024-03-01T12:00:00.000000000Z".to_string()),
        );
        record.insert("deleted_at".to_string(), SqlValue::Null);

        let decoded: Widget = decode(&record).unwrap();
        assert_eq!(decoded, widget());
    }

    #[test]
    fn test_real_column_accepts_integer_storage() {
        let column = Column::new("ratio", ColumnType::Real);
        assert_eq!(decode_value(&column, &SqlValue::Integer(2)).unwrap(), json!(2.0));
    }

    #[test]
    fn test_encode_rejects_wrong_shape() {
        let column = Column::new("count", ColumnType::Integer);
        assert!(encode_value(&column, &json!("three")).is_err());
    }

    #[test]
    fn test_primary_key() {
        assert_eq!(
            primary_key(&widget()).unwrap(),
            SqlValue::Text("w1".to_string())
        );
    }
}
