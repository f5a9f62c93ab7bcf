//! The render pipeline: clause entries in, SQL text and a parameter
//! table out.
//!
//! Every render produces two strings from the same walk order: a display
//! rendering with literals inlined, and a parameterized rendering with
//! engine placeholders. One [`RenderCtx`] is threaded through the whole
//! statement, subqueries included, so parameter labels are unique across
//! nesting and land in the outermost query's table.

use std::sync::Arc;

use crate::dialect::{Dialect, clause_groups};
use crate::error::QuarryResult;
use crate::query::Query;
use crate::value::Value;

/// Whether a render inlines literals or emits placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Display,
    Parameterized,
}

/// One registered parameter: its label, value and escape flag.
///
/// Unescaped entries were inlined verbatim into the SQL; they stay in the
/// table for inspection but are not bound at execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub label: String,
    pub value: Value,
    pub escape: bool,
}

/// The ordered parameter table produced by a parameterized render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    entries: Vec<ParamEntry>,
}

impl ParamTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// The escaped entries, in placeholder order. These are what an
    /// executor binds.
    pub fn bound(&self) -> impl Iterator<Item = &ParamEntry> {
        self.entries.iter().filter(|e| e.escape)
    }
}

/// State threaded through one render pass.
///
/// The context carries the outermost query's dialect: every statement
/// in the pass, subqueries included, renders with that one dialect so a
/// single SQL string never mixes placeholder syntaxes.
pub struct RenderCtx {
    mode: RenderMode,
    dialect: Arc<dyn Dialect>,
    params: ParamTable,
    placeholders: usize,
}

impl RenderCtx {
    pub fn new(mode: RenderMode, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            mode,
            dialect,
            params: ParamTable::default(),
            placeholders: 0,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// The dialect this whole pass renders with.
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Register a value and return the fragment to splice into the SQL.
    ///
    /// Display mode inlines and records nothing. Parameterized mode
    /// records every value under a fresh `prepared_value_<n>` label;
    /// escaped values become dialect placeholders, unescaped values are
    /// inlined as raw text.
    pub fn bind(&mut self, value: Value, escape: bool) -> String {
        if self.mode == RenderMode::Display {
            return if escape {
                value.sql_literal()
            } else {
                value.raw_text()
            };
        }

        let label = format!("prepared_value_{}", self.params.entries.len() + 1);
        let fragment = if escape {
            self.placeholders += 1;
            self.dialect.placeholder(self.placeholders, &label)
        } else {
            value.raw_text()
        };
        self.params.entries.push(ParamEntry {
            label,
            value,
            escape,
        });
        fragment
    }

    pub fn into_params(self) -> ParamTable {
        self.params
    }
}

/// A memoized render result. Cloning shares the parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub display: String,
    pub parameterized: String,
    pub params: Arc<ParamTable>,
}

/// Render one statement (or subquery) into `ctx`. The clause plan comes
/// from the statement kind; each group is delegated to the context's
/// dialect and empty fragments are dropped. A subquery's own dialect is
/// ignored here; the outermost query's dialect governs the whole pass.
pub fn render_statement(query: &Query, ctx: &mut RenderCtx) -> QuarryResult<String> {
    let dialect = ctx.dialect().clone();
    let mut parts = Vec::new();
    for group in clause_groups(query.kind()) {
        let fragment = dialect.render_clause(*group, query, ctx)?;
        if !fragment.is_empty() {
            parts.push(fragment);
        }
    }
    Ok(parts.join(" "))
}

/// Run both render passes over a query.
pub(crate) fn render_query(query: &Query) -> QuarryResult<Rendered> {
    let mut display_ctx = RenderCtx::new(RenderMode::Display, query.dialect().clone());
    let display = render_statement(query, &mut display_ctx)?;

    let mut param_ctx = RenderCtx::new(RenderMode::Parameterized, query.dialect().clone());
    let parameterized = render_statement(query, &mut param_ctx)?;

    Ok(Rendered {
        display,
        parameterized,
        params: Arc::new(param_ctx.into_params()),
    })
}
