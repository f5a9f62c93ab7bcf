//! Engine-neutral result rows and the record traits built on them.

use crate::error::{QuarryError, QuarryResult};
use crate::value::{EnumLabel, FromValue, Value};

/// One result row: ordered named cells holding [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut row = Self::new();
        for (column, value) in pairs {
            row.push(column, value);
        }
        row
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Decode a cell. A missing column decodes as `Null`, so plain types
    /// get their zero value and `Option` gets `None`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> QuarryResult<T> {
        let value = self.get(column).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|e| attach_column(e, column))
    }

    /// Like [`Row::try_get`] but a missing column is an error.
    pub fn try_get_required<T: FromValue>(&self, column: &str) -> QuarryResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| QuarryError::decode(column, "column not present in row"))?;
        T::from_value(value).map_err(|e| attach_column(e, column))
    }

    /// Decode an enum stored by text label.
    pub fn get_enum<E: EnumLabel>(&self, column: &str) -> QuarryResult<E> {
        let label: String = self.try_get_required(column)?;
        E::from_label(&label)
            .ok_or_else(|| QuarryError::decode(column, format!("unknown enum label '{label}'")))
    }
}

// FromValue errors are built without knowing the column; fill it in here.
fn attach_column(err: QuarryError, column: &str) -> QuarryError {
    match err {
        QuarryError::Decode { message, .. } => QuarryError::decode(column, message),
        other => other,
    }
}

/// Construct a record from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> QuarryResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> QuarryResult<Self> {
        Ok(row.clone())
    }
}

/// A record with table metadata, the seam the tracker and the diff-based
/// update path work against.
///
/// `snapshot` returns every persisted field as a `(column, value)` pair;
/// the tracker compares snapshots to find what changed.
pub trait Model: FromRow {
    const TABLE: &'static str;

    fn key_column() -> &'static str;

    fn columns() -> &'static [&'static str];

    fn snapshot(&self) -> Vec<(&'static str, Value)>;

    fn key_value(&self) -> Value {
        let key = Self::key_column();
        self.snapshot()
            .into_iter()
            .find(|(column, _)| *column == key)
            .map(|(_, value)| value)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Polarity {
        Negative,
        Positive,
    }

    impl EnumLabel for Polarity {
        fn label(&self) -> &'static str {
            match self {
                Polarity::Negative => "NEGATIVE",
                Polarity::Positive => "POSITIVE",
            }
        }

        fn from_label(label: &str) -> Option<Self> {
            match label {
                "NEGATIVE" => Some(Polarity::Negative),
                "POSITIVE" => Some(Polarity::Positive),
                _ => None,
            }
        }
    }

    #[test]
    fn missing_column_decodes_as_null() {
        let row = Row::from_pairs([("id", Value::Int(1))]);
        assert_eq!(row.try_get::<i64>("absent").unwrap(), 0);
        assert_eq!(row.try_get::<Option<i64>>("absent").unwrap(), None);
        assert!(row.try_get_required::<i64>("absent").is_err());
    }

    #[test]
    fn enum_round_trips_by_label() {
        let row = Row::from_pairs([("polarity", Value::Text("NEGATIVE".into()))]);
        let p: Polarity = row.get_enum("polarity").unwrap();
        assert_eq!(p, Polarity::Negative);
        // Serializing the enum back produces the same stored label.
        assert_eq!(Value::from(p.label()), Value::Text("NEGATIVE".into()));
    }

    #[test]
    fn unknown_label_is_a_decode_error() {
        let row = Row::from_pairs([("polarity", Value::Text("SIDEWAYS".into()))]);
        let err = row.get_enum::<Polarity>("polarity").unwrap_err();
        assert!(err.to_string().contains("SIDEWAYS"));
    }

    #[test]
    fn decode_error_names_the_column() {
        let row = Row::from_pairs([("age", Value::Bytes(vec![1]))]);
        let err = row.try_get::<i64>("age").unwrap_err();
        assert!(err.to_string().contains("age"));
    }
}
