//! The execution seam: prepared statements in, engine-neutral outcomes
//! out.

use std::future::Future;

use crate::error::{QuarryError, QuarryResult};
use crate::query::render::ParamEntry;
use crate::query::StatementKind;
use crate::row::Row;
use crate::value::{FromValue, Value};

/// A fully rendered statement ready to execute: parameterized SQL plus
/// the escaped parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<ParamEntry>,
}

impl Statement {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.params.iter().map(|p| &p.value)
    }
}

/// What came back from running one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub rows: Vec<Row>,
    pub affected: u64,
    /// The engine-assigned key of a single-row INSERT, where the engine
    /// reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecOutcome {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn with_affected(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }
}

/// Anything that can run a prepared statement against an engine.
pub trait Executor: Send + Sync {
    fn run(&self, statement: &Statement)
    -> impl Future<Output = QuarryResult<ExecOutcome>> + Send;
}

impl<E: Executor> Executor for &E {
    fn run(
        &self,
        statement: &Statement,
    ) -> impl Future<Output = QuarryResult<ExecOutcome>> + Send {
        (**self).run(statement)
    }
}

/// The result-shape contract: how an outcome collapses into a scalar
/// depends on the statement kind, not on the requested type.
///
/// COUNT reads the first cell of the first row; SELECT reports the row
/// count (or presence, for `bool`); INSERT prefers the engine-assigned
/// key when exactly one row was inserted; UPDATE and DELETE report rows
/// affected.
pub trait OutcomeValue: Sized {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self>;
}

fn first_cell(outcome: &ExecOutcome) -> Value {
    outcome
        .rows
        .first()
        .and_then(|row| row.value_at(0))
        .cloned()
        .unwrap_or(Value::Null)
}

impl OutcomeValue for i64 {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self> {
        match kind {
            StatementKind::Count => i64::from_value(&first_cell(outcome)),
            StatementKind::Select => Ok(outcome.rows.len() as i64),
            StatementKind::Insert => {
                if outcome.affected == 1 {
                    Ok(outcome.last_insert_id.unwrap_or(1))
                } else {
                    Ok(outcome.affected as i64)
                }
            }
            _ => Ok(outcome.affected as i64),
        }
    }
}

impl OutcomeValue for i32 {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self> {
        let wide = i64::from_outcome(kind, outcome)?;
        i32::try_from(wide)
            .map_err(|_| QuarryError::decode("", format!("{wide} out of range for i32")))
    }
}

impl OutcomeValue for u64 {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self> {
        let wide = i64::from_outcome(kind, outcome)?;
        u64::try_from(wide)
            .map_err(|_| QuarryError::decode("", format!("{wide} out of range for u64")))
    }
}

impl OutcomeValue for bool {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self> {
        match kind {
            StatementKind::Count => Ok(i64::from_value(&first_cell(outcome))? > 0),
            StatementKind::Select => Ok(!outcome.rows.is_empty()),
            _ => Ok(outcome.affected > 0),
        }
    }
}

impl OutcomeValue for String {
    fn from_outcome(kind: StatementKind, outcome: &ExecOutcome) -> QuarryResult<Self> {
        i64::from_outcome(kind, outcome).map(|n| n.to_string())
    }
}
