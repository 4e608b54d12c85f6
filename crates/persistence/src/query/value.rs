//! Bind values and the tagged input variants the query builder dispatches on.
//!
//! Caller input reaches the builder through [`IntoQueryValue`], which maps
//! every supported source type onto one of the closed [`QueryValue`]
//! variants. Predicate construction then matches on the variant instead of
//! inspecting runtime types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// A scalar value bound to a single placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Exact decimal.
    Decimal(Decimal),
    /// Structured JSON document.
    Json(Value),
}

impl SqlValue {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Returns true if this is the zero value of its kind.
    ///
    /// Partial updates skip zero values, so a field cannot be cleared to
    /// zero through an entity update.
    pub fn is_zero(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Bool(b) => !b,
            SqlValue::Integer(i) => *i == 0,
            SqlValue::Real(f) => *f == 0.0,
            SqlValue::Text(s) => s.is_empty(),
            SqlValue::Timestamp(t) => *t == DateTime::<Utc>::UNIX_EPOCH,
            SqlValue::Decimal(d) => d.is_zero(),
            SqlValue::Json(v) => v.is_null(),
        }
    }

    /// Formats a timestamp the way it is stored: fixed-width RFC 3339 in UTC.
    pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Converts a JSON scalar into a bind value.
    ///
    /// Arrays and objects are kept whole as [`SqlValue::Json`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n
                    .as_u64()
                    .map(|u| SqlValue::Decimal(Decimal::from(u)))
                    .or_else(|| n.as_f64().map(SqlValue::Real))
                    .unwrap_or(SqlValue::Null),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    /// Converts this value into its JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Timestamp(t) => Value::String(Self::format_timestamp(t)),
            SqlValue::Decimal(d) => Value::String(d.to_string()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlValue::Timestamp(t) => write!(f, "'{}'", Self::format_timestamp(t)),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Json(v) => write!(f, "'{}'", v),
        }
    }
}

macro_rules! sql_value_from {
    ($($t:ty => |$v:ident| $e:expr),* $(,)?) => {
        $(
            impl From<$t> for SqlValue {
                fn from($v: $t) -> Self {
                    $e
                }
            }
        )*
    };
}

sql_value_from! {
    bool => |v| SqlValue::Bool(v),
    i8 => |v| SqlValue::Integer(v.into()),
    i16 => |v| SqlValue::Integer(v.into()),
    i32 => |v| SqlValue::Integer(v.into()),
    i64 => |v| SqlValue::Integer(v),
    u8 => |v| SqlValue::Integer(v.into()),
    u16 => |v| SqlValue::Integer(v.into()),
    u32 => |v| SqlValue::Integer(v.into()),
    u64 => |v| i64::try_from(v)
        .map(SqlValue::Integer)
        .unwrap_or_else(|_| SqlValue::Decimal(Decimal::from(v))),
    usize => |v| i64::try_from(v)
        .map(SqlValue::Integer)
        .unwrap_or_else(|_| SqlValue::Decimal(Decimal::from(v))),
    f32 => |v| SqlValue::Real(v.into()),
    f64 => |v| SqlValue::Real(v),
    String => |v| SqlValue::Text(v),
    &str => |v| SqlValue::Text(v.to_string()),
    &String => |v| SqlValue::Text(v.clone()),
    DateTime<Utc> => |v| SqlValue::Timestamp(v),
    NaiveDate => |v| SqlValue::Text(v.format("%Y-%m-%d").to_string()),
    Decimal => |v| SqlValue::Decimal(v),
    Uuid => |v| SqlValue::Text(v.to_string()),
}

/// A positional predicate argument.
///
/// A `List` is an argument group: it is bound to a single placeholder
/// and expanded by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryArg {
    /// A single bound value.
    Value(SqlValue),
    /// A group of values bound to one `(?)` placeholder.
    List(Vec<SqlValue>),
}

impl fmt::Display for QueryArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryArg::Value(v) => write!(f, "{}", v),
            QueryArg::List(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

impl From<SqlValue> for QueryArg {
    fn from(value: SqlValue) -> Self {
        QueryArg::Value(value)
    }
}

/// The closed set of shapes a builder input can take.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Absent value; renders a nullity check.
    Null,
    /// A single comparable value.
    Scalar(SqlValue),
    /// A set of values; renders set membership.
    List(Vec<SqlValue>),
    /// An inclusive lower and upper bound.
    Range(SqlValue, SqlValue),
    /// A structured value with no scalar meaning, matched by membership.
    Composite(SqlValue),
}

/// Conversion from caller input into a [`QueryValue`].
///
/// Implemented for every scalar the storage layer binds, for optional
/// values, and for sequences of scalars. `serde_json::Value` covers input
/// whose shape is only known at runtime.
pub trait IntoQueryValue {
    /// Performs the conversion.
    fn into_query_value(self) -> QueryValue;
}

impl IntoQueryValue for QueryValue {
    fn into_query_value(self) -> QueryValue {
        self
    }
}

impl IntoQueryValue for SqlValue {
    fn into_query_value(self) -> QueryValue {
        match self {
            SqlValue::Null => QueryValue::Null,
            other => QueryValue::Scalar(other),
        }
    }
}

macro_rules! scalar_query_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl IntoQueryValue for $t {
                fn into_query_value(self) -> QueryValue {
                    QueryValue::Scalar(self.into())
                }
            }
        )*
    };
}

scalar_query_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    &str,
    &String,
    DateTime<Utc>,
    NaiveDate,
    Decimal,
    Uuid,
);

macro_rules! borrowed_scalar_query_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl IntoQueryValue for &$t {
                fn into_query_value(self) -> QueryValue {
                    QueryValue::Scalar((*self).into())
                }
            }
        )*
    };
}

borrowed_scalar_query_value!(bool, i32, i64, u32, u64, f64, DateTime<Utc>, Decimal, Uuid);

impl<T: IntoQueryValue> IntoQueryValue for Option<T> {
    fn into_query_value(self) -> QueryValue {
        match self {
            Some(inner) => inner.into_query_value(),
            None => QueryValue::Null,
        }
    }
}

impl<T: Into<SqlValue>> IntoQueryValue for Vec<T> {
    fn into_query_value(self) -> QueryValue {
        QueryValue::List(self.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue> + Clone> IntoQueryValue for &[T] {
    fn into_query_value(self) -> QueryValue {
        QueryValue::List(self.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue> + Clone> IntoQueryValue for &Vec<T> {
    fn into_query_value(self) -> QueryValue {
        self.as_slice().into_query_value()
    }
}

impl<T: Into<SqlValue>, const N: usize> IntoQueryValue for [T; N] {
    fn into_query_value(self) -> QueryValue {
        QueryValue::List(self.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue>> IntoQueryValue for BTreeSet<T> {
    fn into_query_value(self) -> QueryValue {
        QueryValue::List(self.into_iter().map(Into::into).collect())
    }
}

impl IntoQueryValue for Value {
    fn into_query_value(self) -> QueryValue {
        match self {
            Value::Null => QueryValue::Null,
            Value::Array(items) => QueryValue::List(items.iter().map(SqlValue::from_json).collect()),
            Value::Object(_) => QueryValue::Composite(SqlValue::Json(self)),
            scalar => QueryValue::Scalar(SqlValue::from_json(&scalar)),
        }
    }
}

impl IntoQueryValue for &Value {
    fn into_query_value(self) -> QueryValue {
        self.clone().into_query_value()
    }
}
