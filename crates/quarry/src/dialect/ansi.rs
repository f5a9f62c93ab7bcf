//! ANSI-flavored reference dialect.
//!
//! The clause plan is rendered by [`render_clause_with`], parameterized
//! on the outer dialect so engine dialects can reuse the ANSI shape
//! while keeping their own type names. Placeholders come from the render
//! context, which carries the outermost query's dialect.

use crate::dialect::{ClauseGroup, Dialect, TxOp};
use crate::error::{QuarryError, QuarryResult};
use crate::query::clause::{
    BoolOp, Comparer, FieldSelector, FromSource, JoinKind, SetValue, SortOrder, WhereClause,
    WhereOperand,
};
use crate::query::render::{self, RenderCtx};
use crate::query::Query;
use crate::value::{DataKind, Value};

pub struct AnsiDialect;

fn selector(field: &FieldSelector) -> String {
    if field.escape {
        field.qualified()
    } else {
        field.name.clone()
    }
}

fn comparer_sql(comparer: Comparer) -> &'static str {
    match comparer {
        Comparer::Eq => "=",
        Comparer::Ne => "<>",
        Comparer::Gt => ">",
        Comparer::Gte => ">=",
        Comparer::Lt => "<",
        Comparer::Lte => "<=",
        Comparer::Like => "LIKE",
        Comparer::NotLike => "NOT LIKE",
    }
}

fn require_table<'q>(query: &'q Query, what: &str) -> QuarryResult<&'q str> {
    query
        .table()
        .ok_or_else(|| QuarryError::validation(format!("{what} requires a target table")))
}

fn condition(clause: &WhereClause, ctx: &mut RenderCtx) -> QuarryResult<String> {
    let left = selector(&clause.field);
    let op = comparer_sql(clause.comparer);
    match &clause.operand {
        WhereOperand::Value(value) => {
            let fragment = ctx.bind(value.clone(), clause.escape);
            Ok(format!("{left} {op} {fragment}"))
        }
        WhereOperand::Field(right) => Ok(format!("{left} {op} {}", selector(right))),
        WhereOperand::List(values) => {
            // `IN ()` is not SQL; an empty list must fail at render time.
            if values.is_empty() {
                return Err(QuarryError::validation(format!(
                    "IN list for {left} is empty"
                )));
            }
            let mut parts = Vec::with_capacity(values.len());
            for value in values {
                parts.push(ctx.bind(value.clone(), clause.escape));
            }
            Ok(format!("{left} IN ({})", parts.join(", ")))
        }
        WhereOperand::Subquery(inner) => {
            let sql = render::render_statement(inner, ctx)?;
            Ok(format!("{left} IN ({sql})"))
        }
        WhereOperand::Null => match clause.comparer {
            Comparer::Eq => Ok(format!("{left} IS NULL")),
            Comparer::Ne => Ok(format!("{left} IS NOT NULL")),
            other => Err(QuarryError::validation(format!(
                "comparer {other:?} cannot test NULL"
            ))),
        },
    }
}

fn conditions(keyword: &str, list: &[WhereClause], ctx: &mut RenderCtx) -> QuarryResult<String> {
    if list.is_empty() {
        return Ok(String::new());
    }
    let mut out = String::from(keyword);
    out.push(' ');
    for (i, clause) in list.iter().enumerate() {
        if i > 0 {
            out.push_str(match clause.bool_op {
                BoolOp::And => " AND ",
                BoolOp::Or => " OR ",
            });
        }
        out.push_str(&condition(clause, ctx)?);
    }
    Ok(out)
}

/// Render one clause group the ANSI way, taking CREATE type names from
/// `dialect`. Engine dialects call this from their own `render_clause`
/// to inherit the plan.
pub(crate) fn render_clause_with(
    dialect: &dyn Dialect,
    group: ClauseGroup,
    query: &Query,
    ctx: &mut RenderCtx,
) -> QuarryResult<String> {
    match group {
        ClauseGroup::Select => {
            let list = query.select_list();
            if list.is_empty() {
                return Ok("SELECT *".to_string());
            }
            let fields: Vec<String> = list.iter().map(selector).collect();
            Ok(format!("SELECT {}", fields.join(", ")))
        }
        ClauseGroup::CountSelect => Ok("SELECT COUNT(*)".to_string()),
        ClauseGroup::From => {
            let sources = query.from_list();
            if sources.is_empty() {
                return Ok(String::new());
            }
            let mut parts = Vec::with_capacity(sources.len());
            for source in sources {
                match source {
                    FromSource::Table(table) => parts.push(table.clone()),
                    FromSource::Subquery { query: inner, alias } => {
                        let sql = render::render_statement(inner, ctx)?;
                        parts.push(format!("({sql}) AS {alias}"));
                    }
                }
            }
            Ok(format!("FROM {}", parts.join(", ")))
        }
        ClauseGroup::Join => {
            let joins = query.join_list();
            if joins.is_empty() {
                return Ok(String::new());
            }
            let mut parts = Vec::with_capacity(joins.len());
            for join in joins {
                let kind = match join.kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                    JoinKind::Right => "RIGHT JOIN",
                };
                parts.push(format!(
                    "{kind} {} ON {} = {}",
                    join.table,
                    selector(&join.left),
                    selector(&join.right)
                ));
            }
            Ok(parts.join(" "))
        }
        ClauseGroup::Where => conditions("WHERE", query.where_list(), ctx),
        ClauseGroup::GroupBy => {
            let list = query.group_list();
            if list.is_empty() {
                return Ok(String::new());
            }
            let fields: Vec<String> = list.iter().map(selector).collect();
            Ok(format!("GROUP BY {}", fields.join(", ")))
        }
        ClauseGroup::Having => conditions("HAVING", query.having_list(), ctx),
        ClauseGroup::OrderBy => {
            let list = query.order_list();
            if list.is_empty() {
                return Ok(String::new());
            }
            let parts: Vec<String> = list
                .iter()
                .map(|o| {
                    let dir = match o.order {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    format!("{} {dir}", selector(&o.field))
                })
                .collect();
            Ok(format!("ORDER BY {}", parts.join(", ")))
        }
        ClauseGroup::Limit => match query.limit_window() {
            Some((count, offset)) => Ok(format!("LIMIT {count} OFFSET {offset}")),
            None => Ok(String::new()),
        },
        ClauseGroup::InsertInto => {
            let table = require_table(query, "INSERT")?;
            let columns = query.column_set();
            if columns.is_empty() {
                return Err(QuarryError::validation("INSERT requires at least one column"));
            }
            Ok(format!("INSERT INTO {table} ({})", columns.join(", ")))
        }
        ClauseGroup::Values => {
            let rows = query.value_rows();
            if rows.is_empty() {
                return Err(QuarryError::validation(
                    "INSERT requires at least one value row",
                ));
            }
            let columns = query.column_set();
            let mut rendered_rows = Vec::with_capacity(rows.len());
            for row in rows {
                let mut cells = Vec::with_capacity(columns.len());
                for column in columns {
                    // A row without a cell for this column inserts NULL.
                    let value = row
                        .iter()
                        .find(|(c, _)| c == column)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null);
                    cells.push(ctx.bind(value, true));
                }
                rendered_rows.push(format!("({})", cells.join(", ")));
            }
            Ok(format!("VALUES {}", rendered_rows.join(", ")))
        }
        ClauseGroup::UpdateTable => {
            let table = require_table(query, "UPDATE")?;
            Ok(format!("UPDATE {table}"))
        }
        ClauseGroup::Set => {
            let sets = query.set_list();
            if sets.is_empty() {
                return Err(QuarryError::validation(
                    "UPDATE requires at least one SET entry",
                ));
            }
            let mut parts = Vec::with_capacity(sets.len());
            for set in sets {
                let fragment = match &set.value {
                    SetValue::Value(value) => ctx.bind(value.clone(), true),
                    SetValue::Raw(raw) => raw.clone(),
                };
                parts.push(format!("{} = {fragment}", set.column));
            }
            Ok(format!("SET {}", parts.join(", ")))
        }
        ClauseGroup::DeleteFrom => {
            let table = require_table(query, "DELETE")?;
            Ok(format!("DELETE FROM {table}"))
        }
        ClauseGroup::Create => {
            let table = require_table(query, "CREATE")?;
            let columns = query.create_list();
            if columns.is_empty() {
                return Err(QuarryError::validation("CREATE requires at least one column"));
            }
            let mut parts = Vec::with_capacity(columns.len());
            for column in columns {
                let type_name = dialect.data_kind_name(column.kind)?;
                match &column.constraints {
                    Some(constraints) => {
                        parts.push(format!("{} {type_name} {constraints}", column.name))
                    }
                    None => parts.push(format!("{} {type_name}", column.name)),
                }
            }
            Ok(format!("CREATE TABLE {table} ({})", parts.join(", ")))
        }
        ClauseGroup::Raw => Ok(query.raw_sql().unwrap_or_default().to_string()),
    }
}

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn render_clause(
        &self,
        group: ClauseGroup,
        query: &Query,
        ctx: &mut RenderCtx,
    ) -> QuarryResult<String> {
        render_clause_with(self, group, query, ctx)
    }

    fn data_kind_name(&self, kind: DataKind) -> QuarryResult<&'static str> {
        Ok(match kind {
            DataKind::Boolean => "BOOLEAN",
            DataKind::Integer => "INTEGER",
            DataKind::Float => "FLOAT",
            DataKind::Text => "VARCHAR(255)",
            DataKind::Binary => "BLOB",
            DataKind::Timestamp => "TIMESTAMP",
        })
    }

    fn transaction_fragment(&self, op: TxOp, name: Option<&str>) -> QuarryResult<String> {
        let named = |verb: &str| {
            name.map(|n| format!("{verb} {n}")).ok_or_else(|| {
                QuarryError::validation(format!("{verb} requires a savepoint name"))
            })
        };
        match op {
            TxOp::Begin => Ok("BEGIN".to_string()),
            TxOp::Commit => Ok("COMMIT".to_string()),
            TxOp::Rollback => Ok("ROLLBACK".to_string()),
            TxOp::Savepoint => named("SAVEPOINT"),
            TxOp::Release => named("RELEASE SAVEPOINT"),
            TxOp::RollbackTo => named("ROLLBACK TO SAVEPOINT"),
        }
    }
}
