//! Scripted executor for unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use crate::error::{QuarryError, QuarryResult};
use crate::executor::{ExecOutcome, Executor, Statement};
use crate::row::Row;
use crate::value::Value;

/// Replays queued outcomes in order and records every statement it was
/// asked to run. An empty queue answers with an empty outcome, which
/// reads as "no more rows".
#[derive(Default)]
pub(crate) struct MockExecutor {
    responses: Mutex<VecDeque<QuarryResult<ExecOutcome>>>,
    log: Mutex<Vec<Statement>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: ExecOutcome) {
        self.responses.lock().unwrap().push_back(Ok(outcome));
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push(ExecOutcome::with_rows(rows));
    }

    pub fn push_affected(&self, affected: u64) {
        self.push(ExecOutcome::with_affected(affected));
    }

    pub fn push_error(&self, error: QuarryError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl Executor for MockExecutor {
    fn run(
        &self,
        statement: &Statement,
    ) -> impl Future<Output = QuarryResult<ExecOutcome>> + Send {
        self.log.lock().unwrap().push(statement.clone());
        let result = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutcome::default()));
        async move { result }
    }
}

/// A row of sequential integer ids, the shape most cursor tests want.
pub(crate) fn id_row(id: i64) -> Row {
    Row::from_pairs([("id", Value::Int(id))])
}
