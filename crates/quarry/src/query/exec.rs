//! Execution methods on [`Query`].

use crate::error::{QuarryError, QuarryResult};
use crate::executor::{ExecOutcome, Executor, OutcomeValue};
use crate::query::Query;
use crate::row::{FromRow, Row};

impl Query {
    /// Render, execute, and hand back the raw outcome. On failure the
    /// query's error hook (if any) sees the error before it propagates.
    pub async fn run<E: Executor>(&mut self, executor: &E) -> QuarryResult<ExecOutcome> {
        let statement = self.prepare()?;
        match executor.run(&statement).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                if let Some(hook) = self.error_hook() {
                    hook(&*self, &error);
                }
                Err(error)
            }
        }
    }

    /// Execute and return the result rows.
    pub async fn rows<E: Executor>(&mut self, executor: &E) -> QuarryResult<Vec<Row>> {
        Ok(self.run(executor).await?.rows)
    }

    /// Execute and map every row into `T`.
    pub async fn fetch_all<T, E>(&mut self, executor: &E) -> QuarryResult<Vec<T>>
    where
        T: FromRow,
        E: Executor,
    {
        self.rows(executor).await?.iter().map(T::from_row).collect()
    }

    /// Execute and map the first row, if any.
    pub async fn fetch_opt<T, E>(&mut self, executor: &E) -> QuarryResult<Option<T>>
    where
        T: FromRow,
        E: Executor,
    {
        match self.rows(executor).await?.first() {
            Some(row) => T::from_row(row).map(Some),
            None => Ok(None),
        }
    }

    /// Execute and map the first row; no rows is an error.
    pub async fn fetch_one<T, E>(&mut self, executor: &E) -> QuarryResult<T>
    where
        T: FromRow,
        E: Executor,
    {
        self.fetch_opt(executor)
            .await?
            .ok_or_else(|| QuarryError::not_found("query returned no rows"))
    }

    /// Execute and return rows affected.
    pub async fn execute<E: Executor>(&mut self, executor: &E) -> QuarryResult<u64> {
        Ok(self.run(executor).await?.affected)
    }

    /// Execute and read the outcome as a count under the result-shape
    /// contract: the first cell for COUNT statements, the row count for
    /// SELECT, rows affected otherwise.
    pub async fn count<E: Executor>(&mut self, executor: &E) -> QuarryResult<i64> {
        self.execute_as(executor).await
    }

    /// Execute and collapse the outcome into `T` under the result-shape
    /// contract for this statement kind.
    pub async fn execute_as<T, E>(&mut self, executor: &E) -> QuarryResult<T>
    where
        T: OutcomeValue,
        E: Executor,
    {
        let kind = self.kind();
        let outcome = self.run(executor).await?;
        T::from_outcome(kind, &outcome)
    }
}
