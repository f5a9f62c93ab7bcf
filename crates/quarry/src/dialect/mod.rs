//! Dialect seam: clause entries become SQL fragments here.
//!
//! A [`Dialect`] renders one clause group at a time. Every method has a
//! default that answers [`QuarryError::Unsupported`], so a partial dialect
//! fails loudly the first time a query reaches for something it cannot
//! express, rather than emitting broken SQL.

mod ansi;
mod postgres;

pub use ansi::AnsiDialect;
pub use postgres::PostgresDialect;

use std::sync::Arc;

use crate::error::{QuarryError, QuarryResult};
use crate::query::render::RenderCtx;
use crate::query::{Query, StatementKind};
use crate::value::DataKind;

/// The clause groups a statement is assembled from, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseGroup {
    Select,
    CountSelect,
    From,
    Join,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    InsertInto,
    Values,
    UpdateTable,
    Set,
    DeleteFrom,
    Create,
    Raw,
}

/// Transaction control operations a dialect can phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOp {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Release,
    RollbackTo,
}

/// The clause plan for each statement kind. Groups render in this order;
/// a group with nothing to say renders to an empty fragment.
pub fn clause_groups(kind: StatementKind) -> &'static [ClauseGroup] {
    use ClauseGroup::*;
    match kind {
        StatementKind::Select => &[
            Select, From, Join, Where, GroupBy, Having, OrderBy, Limit,
        ],
        StatementKind::Count => &[CountSelect, From, Join, Where],
        StatementKind::Insert => &[InsertInto, Values],
        StatementKind::Update => &[UpdateTable, Set, Where],
        StatementKind::Delete => &[DeleteFrom, Where],
        StatementKind::Create => &[Create],
        StatementKind::Raw => &[Raw],
    }
}

/// Renders clause groups, placeholders, type names and transaction
/// fragments for one SQL engine.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render one clause group of `query` into SQL. Values go through
    /// `ctx` so parameters are registered in statement order.
    fn render_clause(
        &self,
        group: ClauseGroup,
        query: &Query,
        ctx: &mut RenderCtx,
    ) -> QuarryResult<String> {
        let _ = (query, ctx);
        Err(QuarryError::unsupported(
            format!("clause group {group:?}"),
            self.name(),
        ))
    }

    /// The placeholder for the `index`-th bound parameter (1-based).
    /// `label` is the parameter's table label, for dialects that use
    /// named placeholders.
    fn placeholder(&self, index: usize, label: &str) -> String {
        let _ = (index, label);
        "?".to_string()
    }

    /// The type name for a column data kind in CREATE statements.
    fn data_kind_name(&self, kind: DataKind) -> QuarryResult<&'static str> {
        Err(QuarryError::unmapped(format!(
            "data kind {kind:?} in dialect '{}'",
            self.name()
        )))
    }

    /// The SQL for a transaction control operation. `name` is the
    /// savepoint name where the operation takes one.
    fn transaction_fragment(&self, op: TxOp, name: Option<&str>) -> QuarryResult<String> {
        let _ = name;
        Err(QuarryError::unsupported(format!("transaction op {op:?}"), self.name()))
    }
}

/// The shared default dialect handed to queries built without an
/// explicit one.
pub fn ansi() -> Arc<dyn Dialect> {
    Arc::new(AnsiDialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Partial;

    impl Dialect for Partial {
        fn name(&self) -> &'static str {
            "partial"
        }
    }

    #[test]
    fn defaults_answer_unsupported() {
        let d = Partial;
        let mut ctx = RenderCtx::new(crate::query::render::RenderMode::Display, ansi());
        let q = crate::query::select();
        let err = d.render_clause(ClauseGroup::Where, &q, &mut ctx).unwrap_err();
        assert!(matches!(err, QuarryError::Unsupported { .. }));
        assert!(d.data_kind_name(DataKind::Text).is_err());
        assert!(d.transaction_fragment(TxOp::Begin, None).is_err());
    }
}
