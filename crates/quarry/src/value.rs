//! The closed scalar value set carried through queries, parameters and rows.
//!
//! Every value that enters a query or comes back in a result row is one of
//! the [`Value`] variants. Keeping the set closed means rendering, hashing
//! and decoding are total over it; anything an engine cannot represent is
//! rejected with [`QuarryError::Unmapped`] when the value is first mapped,
//! never at statement time.

use chrono::{DateTime, Utc};
use std::hash::{Hash, Hasher};

use crate::error::{QuarryError, QuarryResult};

/// A scalar value in a query or a result row.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `Null` and for empty text, the two shapes a key column
    /// must never have.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Render the value as a standalone SQL literal, for the display
    /// rendering of a query. Text is single-quoted with `'` doubled.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => {
                let mut out = String::with_capacity(b.len() * 2 + 3);
                out.push_str("X'");
                for byte in b {
                    out.push_str(&format!("{byte:02X}"));
                }
                out.push('\'');
                out
            }
            Value::Timestamp(t) => format!("'{}'", t.to_rfc3339()),
        }
    }

    /// Render the value as raw SQL text. Text passes through unquoted,
    /// which is what an unescaped parameter means: the caller vouches for
    /// the fragment (`NOW()`, `count + 1`).
    pub fn raw_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            other => other.sql_literal(),
        }
    }

    /// Interpret the value as a keyset key. Integers pass through, text
    /// is parsed; anything else is not a usable key.
    pub fn as_key_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The data kind this value belongs to. `Null` carries no kind.
    pub fn data_kind(&self) -> QuarryResult<DataKind> {
        match self {
            Value::Null => Err(QuarryError::unmapped("NULL value")),
            Value::Bool(_) => Ok(DataKind::Boolean),
            Value::Int(_) => Ok(DataKind::Integer),
            Value::Float(_) => Ok(DataKind::Float),
            Value::Text(_) => Ok(DataKind::Text),
            Value::Bytes(_) => Ok(DataKind::Binary),
            Value::Timestamp(_) => Ok(DataKind::Timestamp),
        }
    }
}

// Floats compare and hash by bit pattern so Value can key a HashMap.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Timestamp(t) => t.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Engine-independent column data kinds, used by CREATE statements and
/// dialect type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Boolean,
    Integer,
    Float,
    Text,
    Binary,
    Timestamp,
}

/// Decode a [`Value`] into a concrete Rust type.
///
/// Plain types decode `Null` to their zero value; wrap in `Option` to
/// observe nullability.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> QuarryResult<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(0),
            Value::Int(i) => Ok(*i),
            Value::Text(s) => s
                .parse()
                .map_err(|_| QuarryError::decode("", format!("cannot parse '{s}' as integer"))),
            other => Err(QuarryError::decode("", format!("expected integer, got {other:?}"))),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| QuarryError::decode("", format!("{wide} out of range for i32")))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        let wide = i64::from_value(value)?;
        u64::try_from(wide)
            .map_err(|_| QuarryError::decode("", format!("{wide} out of range for u64")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(QuarryError::decode("", format!("expected float, got {other:?}"))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            other => Err(QuarryError::decode("", format!("expected boolean, got {other:?}"))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(QuarryError::decode("", format!("expected text, got {other:?}"))),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Timestamp(t) => Ok(*t),
            other => Err(QuarryError::decode("", format!("expected timestamp, got {other:?}"))),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(QuarryError::decode("", format!("expected bytes, got {other:?}"))),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        Ok(value.clone())
    }
}

impl<T> FromValue for Option<T>
where
    T: FromValue,
{
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Enum values stored by text label rather than ordinal.
///
/// A column holding `"NEGATIVE"` round-trips through the enum and comes
/// back out as `"NEGATIVE"`; the numeric discriminant never reaches SQL.
pub trait EnumLabel: Sized {
    fn label(&self) -> &'static str;
    fn from_label(label: &str) -> Option<Self>;
}
