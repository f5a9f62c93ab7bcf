//! PostgreSQL dialect: the ANSI clause plan with `$n` placeholders and
//! Postgres type names.

use crate::dialect::ansi::render_clause_with;
use crate::dialect::{AnsiDialect, ClauseGroup, Dialect, TxOp};
use crate::error::QuarryResult;
use crate::query::render::RenderCtx;
use crate::query::Query;
use crate::value::DataKind;

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn render_clause(
        &self,
        group: ClauseGroup,
        query: &Query,
        ctx: &mut RenderCtx,
    ) -> QuarryResult<String> {
        render_clause_with(self, group, query, ctx)
    }

    fn placeholder(&self, index: usize, _label: &str) -> String {
        format!("${index}")
    }

    fn data_kind_name(&self, kind: DataKind) -> QuarryResult<&'static str> {
        Ok(match kind {
            DataKind::Boolean => "BOOLEAN",
            DataKind::Integer => "BIGINT",
            DataKind::Float => "DOUBLE PRECISION",
            DataKind::Text => "TEXT",
            DataKind::Binary => "BYTEA",
            DataKind::Timestamp => "TIMESTAMPTZ",
        })
    }

    fn transaction_fragment(&self, op: TxOp, name: Option<&str>) -> QuarryResult<String> {
        AnsiDialect.transaction_fragment(op, name)
    }
}
