//! Execution hooks and the instrumented executor wrapper.

use std::time::{Duration, Instant};

use crate::error::{QuarryError, QuarryResult};
use crate::executor::{ExecOutcome, Executor, Statement};

/// Observes statement execution. All methods default to no-ops, so a
/// hook implements only what it cares about.
pub trait ExecHook: Send + Sync {
    fn on_execute(&self, sql: &str) {
        let _ = sql;
    }

    fn on_complete(&self, sql: &str, outcome: &ExecOutcome, elapsed: Duration) {
        let _ = (sql, outcome, elapsed);
    }

    fn on_error(&self, sql: &str, error: &QuarryError) {
        let _ = (sql, error);
    }
}

pub struct NoopHook;

impl ExecHook for NoopHook {}

/// Wraps an executor and reports every statement to a hook. Errors
/// still propagate after the hook sees them.
pub struct InstrumentedExecutor<E, H> {
    inner: E,
    hook: H,
}

impl<E, H> InstrumentedExecutor<E, H> {
    pub fn new(inner: E, hook: H) -> Self {
        Self { inner, hook }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E, H> Executor for InstrumentedExecutor<E, H>
where
    E: Executor,
    H: ExecHook,
{
    async fn run(&self, statement: &Statement) -> QuarryResult<ExecOutcome> {
        self.hook.on_execute(&statement.sql);
        let started = Instant::now();
        match self.inner.run(statement).await {
            Ok(outcome) => {
                self.hook.on_complete(&statement.sql, &outcome, started.elapsed());
                Ok(outcome)
            }
            Err(error) => {
                self.hook.on_error(&statement.sql, &error);
                Err(error)
            }
        }
    }
}

/// Logs execution through `tracing`: debug spans for completions,
/// warnings for failures.
#[cfg(feature = "tracing")]
pub struct TracingHook;

#[cfg(feature = "tracing")]
impl ExecHook for TracingHook {
    fn on_execute(&self, sql: &str) {
        tracing::debug!(target: "quarry::exec", sql, "executing");
    }

    fn on_complete(&self, sql: &str, outcome: &ExecOutcome, elapsed: Duration) {
        tracing::debug!(
            target: "quarry::exec",
            sql,
            rows = outcome.rows.len(),
            affected = outcome.affected,
            elapsed_ms = elapsed.as_millis() as u64,
            "completed"
        );
    }

    fn on_error(&self, sql: &str, error: &QuarryError) {
        tracing::warn!(target: "quarry::exec", sql, %error, "failed");
    }
}
