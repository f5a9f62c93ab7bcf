//! Clause entries stored by the query model.
//!
//! These are plain data: no SQL text lives here. Dialects turn clause
//! entries into fragments at render time.

use crate::query::Query;
use crate::value::{DataKind, Value};

/// Statement kinds a query can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Raw,
    Select,
    Insert,
    Update,
    Delete,
    Count,
    Create,
}

/// A column reference, optionally table-qualified.
///
/// `escape: false` marks a selector the dialect must emit verbatim
/// (expressions like `COUNT(*)` or `price * quantity`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub table: Option<String>,
    pub name: String,
    pub escape: bool,
}

impl FieldSelector {
    /// Parse `col` or `table.col`. Inputs containing parentheses or
    /// whitespace are taken as raw expressions and left untouched.
    pub fn parse(input: &str) -> Self {
        if input.contains('(') || input.contains(' ') {
            return Self::raw(input);
        }
        match input.split_once('.') {
            Some((table, name)) => Self {
                table: Some(table.to_string()),
                name: name.to_string(),
                escape: true,
            },
            None => Self {
                table: None,
                name: input.to_string(),
                escape: true,
            },
        }
    }

    pub fn raw(input: &str) -> Self {
        Self {
            table: None,
            name: input.to_string(),
            escape: false,
        }
    }

    pub fn qualified(&self) -> String {
        match &self.table {
            Some(table) => format!("{table}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Comparison operators usable in WHERE and HAVING entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparer {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

/// How a WHERE entry chains onto the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// The right-hand side of a WHERE or HAVING entry.
#[derive(Debug, Clone)]
pub enum WhereOperand {
    /// Compare against a bound (or inlined, if unescaped) value.
    Value(Value),
    /// Compare field to field.
    Field(FieldSelector),
    /// Membership in an explicit value list.
    List(Vec<Value>),
    /// Membership in a subquery's result.
    Subquery(Box<Query>),
    /// NULL test; the comparer picks IS NULL vs IS NOT NULL.
    Null,
}

#[derive(Debug, Clone)]
pub struct WhereClause {
    pub field: FieldSelector,
    pub comparer: Comparer,
    pub operand: WhereOperand,
    pub bool_op: BoolOp,
    pub escape: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub table: String,
    pub left: FieldSelector,
    pub right: FieldSelector,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderClause {
    pub field: FieldSelector,
    pub order: SortOrder,
}

/// A SET assignment: either a bound value or a raw fragment the caller
/// vouches for (`updated_at = NOW()`).
#[derive(Debug, Clone)]
pub enum SetValue {
    Value(Value),
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct SetClause {
    pub column: String,
    pub value: SetValue,
}

/// A column definition in a CREATE statement.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: DataKind,
    pub constraints: Option<String>,
}

/// A FROM source: a table name or a parenthesized subquery with alias.
#[derive(Debug, Clone)]
pub enum FromSource {
    Table(String),
    Subquery { query: Box<Query>, alias: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_splits_table_prefix() {
        let f = FieldSelector::parse("users.id");
        assert_eq!(f.table.as_deref(), Some("users"));
        assert_eq!(f.name, "id");
        assert!(f.escape);
        assert_eq!(f.qualified(), "users.id");
    }

    #[test]
    fn selector_keeps_expressions_raw() {
        let f = FieldSelector::parse("COUNT(*)");
        assert_eq!(f.table, None);
        assert_eq!(f.name, "COUNT(*)");
        assert!(!f.escape);
    }
}
