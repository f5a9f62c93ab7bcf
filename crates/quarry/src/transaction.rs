//! Transaction scopes over any executor.
//!
//! A [`TransactionScope`] tracks what is open, in order. The outermost
//! `begin` issues BEGIN; nested or named begins become savepoints with
//! generated `quarry_sp_<n>` names when the caller does not supply one.
//! The SQL itself comes from the dialect's transaction fragments, so an
//! engine with different phrasing only overrides the dialect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dialect::{self, Dialect, TxOp};
use crate::error::{QuarryError, QuarryResult};
use crate::executor::{Executor, Statement};
use crate::query::StatementKind;

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("quarry_sp_{n}")
}

struct OpenTx {
    name: Option<String>,
    savepoint: bool,
}

pub struct TransactionScope {
    dialect: Arc<dyn Dialect>,
    open: Vec<OpenTx>,
}

impl Default for TransactionScope {
    fn default() -> Self {
        Self::new(dialect::ansi())
    }
}

impl TransactionScope {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            open: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// The names of open transactions and savepoints, outermost first.
    /// Anonymous savepoints appear under their generated names; an
    /// anonymous outer transaction has no name.
    pub fn open_names(&self) -> Vec<&str> {
        self.open
            .iter()
            .filter_map(|tx| tx.name.as_deref())
            .collect()
    }

    async fn control<E: Executor>(&self, executor: &E, sql: String) -> QuarryResult<()> {
        let statement = Statement {
            kind: StatementKind::Raw,
            sql,
            params: Vec::new(),
        };
        executor.run(&statement).await?;
        Ok(())
    }

    /// Open a transaction. The first `begin` issues BEGIN; any further
    /// `begin` issues a savepoint, named by the caller or generated.
    pub async fn begin<E: Executor>(
        &mut self,
        executor: &E,
        name: Option<&str>,
    ) -> QuarryResult<()> {
        if self.open.is_empty() {
            let sql = self.dialect.transaction_fragment(TxOp::Begin, None)?;
            self.control(executor, sql).await?;
            self.open.push(OpenTx {
                name: name.map(str::to_string),
                savepoint: false,
            });
        } else {
            let savepoint = name
                .map(str::to_string)
                .unwrap_or_else(next_savepoint_name);
            let sql = self
                .dialect
                .transaction_fragment(TxOp::Savepoint, Some(&savepoint))?;
            self.control(executor, sql).await?;
            self.open.push(OpenTx {
                name: Some(savepoint),
                savepoint: true,
            });
        }
        Ok(())
    }

    /// Commit. Unnamed commits the whole scope; naming the outer
    /// transaction does the same, naming a savepoint releases it and
    /// everything opened after it.
    pub async fn commit<E: Executor>(
        &mut self,
        executor: &E,
        name: Option<&str>,
    ) -> QuarryResult<()> {
        match self.locate(name)? {
            Target::Whole => {
                let sql = self.dialect.transaction_fragment(TxOp::Commit, None)?;
                self.control(executor, sql).await?;
                self.open.clear();
            }
            Target::Savepoint(position) => {
                let savepoint = self.open[position]
                    .name
                    .clone()
                    .unwrap_or_default();
                let sql = self
                    .dialect
                    .transaction_fragment(TxOp::Release, Some(&savepoint))?;
                self.control(executor, sql).await?;
                self.open.truncate(position);
            }
        }
        Ok(())
    }

    /// Roll back. Unnamed rolls back the whole scope; naming a
    /// savepoint rolls back to it, keeping the savepoint itself open.
    pub async fn rollback<E: Executor>(
        &mut self,
        executor: &E,
        name: Option<&str>,
    ) -> QuarryResult<()> {
        match self.locate(name)? {
            Target::Whole => {
                let sql = self.dialect.transaction_fragment(TxOp::Rollback, None)?;
                self.control(executor, sql).await?;
                self.open.clear();
            }
            Target::Savepoint(position) => {
                let savepoint = self.open[position]
                    .name
                    .clone()
                    .unwrap_or_default();
                let sql = self
                    .dialect
                    .transaction_fragment(TxOp::RollbackTo, Some(&savepoint))?;
                self.control(executor, sql).await?;
                self.open.truncate(position + 1);
            }
        }
        Ok(())
    }

    fn locate(&self, name: Option<&str>) -> QuarryResult<Target> {
        if self.open.is_empty() {
            return Err(QuarryError::validation("no open transaction"));
        }
        let Some(name) = name else {
            return Ok(Target::Whole);
        };
        let position = self
            .open
            .iter()
            .rposition(|tx| tx.name.as_deref() == Some(name))
            .ok_or_else(|| {
                QuarryError::validation(format!("no open transaction named '{name}'"))
            })?;
        if self.open[position].savepoint {
            Ok(Target::Savepoint(position))
        } else {
            Ok(Target::Whole)
        }
    }
}

enum Target {
    Whole,
    Savepoint(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;

    fn sql_log(exec: &MockExecutor) -> Vec<String> {
        exec.statements().iter().map(|s| s.sql.clone()).collect()
    }

    #[tokio::test]
    async fn outer_begin_then_commit() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, None).await.unwrap();
        assert_eq!(scope.depth(), 1);
        scope.commit(&exec, None).await.unwrap();
        assert_eq!(scope.depth(), 0);
        assert_eq!(sql_log(&exec), ["BEGIN", "COMMIT"]);
    }

    #[tokio::test]
    async fn nested_begin_becomes_a_savepoint() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, None).await.unwrap();
        scope.begin(&exec, None).await.unwrap();
        assert_eq!(scope.depth(), 2);
        let log = sql_log(&exec);
        assert!(log[1].starts_with("SAVEPOINT quarry_sp_"));
    }

    #[tokio::test]
    async fn named_savepoint_release_and_rollback() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, None).await.unwrap();
        scope.begin(&exec, Some("stage")).await.unwrap();
        assert_eq!(scope.open_names(), ["stage"]);

        scope.rollback(&exec, Some("stage")).await.unwrap();
        // rolling back to a savepoint keeps it open
        assert_eq!(scope.depth(), 2);

        scope.commit(&exec, Some("stage")).await.unwrap();
        assert_eq!(scope.depth(), 1);

        scope.commit(&exec, None).await.unwrap();
        assert_eq!(
            sql_log(&exec),
            [
                "BEGIN",
                "SAVEPOINT stage",
                "ROLLBACK TO SAVEPOINT stage",
                "RELEASE SAVEPOINT stage",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn releasing_a_savepoint_closes_everything_above_it() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, None).await.unwrap();
        scope.begin(&exec, Some("a")).await.unwrap();
        scope.begin(&exec, Some("b")).await.unwrap();
        scope.commit(&exec, Some("a")).await.unwrap();
        assert_eq!(scope.depth(), 1);
        assert!(scope.open_names().is_empty());
    }

    #[tokio::test]
    async fn commit_without_open_transaction_is_an_error() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        assert!(scope.commit(&exec, None).await.is_err());
        assert!(scope.rollback(&exec, None).await.is_err());
        assert_eq!(exec.statement_count(), 0);
    }

    #[tokio::test]
    async fn unknown_savepoint_name_is_an_error() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, None).await.unwrap();
        assert!(scope.commit(&exec, Some("ghost")).await.is_err());
        assert_eq!(scope.depth(), 1);
    }

    #[tokio::test]
    async fn naming_the_outer_transaction_commits_the_whole_scope() {
        let exec = MockExecutor::new();
        let mut scope = TransactionScope::default();
        scope.begin(&exec, Some("outer")).await.unwrap();
        scope.begin(&exec, Some("inner")).await.unwrap();
        scope.commit(&exec, Some("outer")).await.unwrap();
        assert_eq!(scope.depth(), 0);
        assert_eq!(sql_log(&exec)[2], "COMMIT");
    }
}
