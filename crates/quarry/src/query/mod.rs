//! The mutable query model and its fluent construction surface.
//!
//! A [`Query`] accumulates clause entries and renders lazily: the first
//! call to [`Query::render`] (or anything built on it) produces both the
//! display SQL and the parameterized SQL plus the parameter table, and
//! the result is memoized until a mutator dirties the model again.

pub mod clause;
mod exec;
pub mod render;

use std::sync::Arc;

use crate::dialect::{self, Dialect};
use crate::error::{QuarryError, QuarryResult};
use crate::executor::Statement;
use crate::value::{DataKind, Value};

pub use clause::{Comparer, SortOrder, StatementKind};
pub use render::{ParamEntry, ParamTable, RenderCtx, RenderMode, Rendered};

use clause::{
    BoolOp, ColumnDef, FieldSelector, FromSource, JoinClause, JoinKind, OrderClause, SetClause,
    SetValue, WhereClause, WhereOperand,
};

type ErrorHook = dyn Fn(&Query, &QuarryError) + Send + Sync;

/// A single SQL statement under construction.
#[derive(Clone)]
pub struct Query {
    kind: StatementKind,
    table: Option<String>,
    select_list: Vec<FieldSelector>,
    from_list: Vec<FromSource>,
    join_list: Vec<JoinClause>,
    where_list: Vec<WhereClause>,
    having_list: Vec<WhereClause>,
    group_list: Vec<FieldSelector>,
    order_list: Vec<OrderClause>,
    set_list: Vec<SetClause>,
    column_set: Vec<String>,
    value_rows: Vec<Vec<(String, Value)>>,
    create_list: Vec<ColumnDef>,
    limit: Option<(u64, u64)>,
    raw_sql: Option<String>,
    dialect: Arc<dyn Dialect>,
    error_hook: Option<Arc<ErrorHook>>,
    dirty: bool,
    rendered: Option<Rendered>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("dialect", &self.dialect.name())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Start a SELECT query.
pub fn select() -> Query {
    Query::new(StatementKind::Select)
}

/// Start an INSERT into `table`.
pub fn insert_into(table: &str) -> Query {
    Query::new(StatementKind::Insert).target(table)
}

/// Start an UPDATE of `table`.
pub fn update(table: &str) -> Query {
    Query::new(StatementKind::Update).target(table)
}

/// Start a DELETE from `table`.
pub fn delete_from(table: &str) -> Query {
    Query::new(StatementKind::Delete).target(table)
}

/// Start a COUNT(*) over `table`.
pub fn count_from(table: &str) -> Query {
    let mut q = Query::new(StatementKind::Count);
    q.from_list.push(FromSource::Table(table.to_string()));
    q
}

/// Start a CREATE TABLE for `table`.
pub fn create_table(table: &str) -> Query {
    Query::new(StatementKind::Create).target(table)
}

/// Wrap a raw SQL string. Rendered verbatim; no parameters are bound.
pub fn raw(sql: &str) -> Query {
    let mut q = Query::new(StatementKind::Raw);
    q.raw_sql = Some(sql.to_string());
    q
}

impl Query {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            table: None,
            select_list: Vec::new(),
            from_list: Vec::new(),
            join_list: Vec::new(),
            where_list: Vec::new(),
            having_list: Vec::new(),
            group_list: Vec::new(),
            order_list: Vec::new(),
            set_list: Vec::new(),
            column_set: Vec::new(),
            value_rows: Vec::new(),
            create_list: Vec::new(),
            limit: None,
            raw_sql: None,
            dialect: dialect::ansi(),
            error_hook: None,
            dirty: true,
            rendered: None,
        }
    }

    fn target(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Swap the dialect. Dirties the query; both renderings depend on it.
    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self.mark_dirty();
        self
    }

    /// Install a hook invoked with the query and the error whenever an
    /// execution of this query fails. The error still propagates.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Query, &QuarryError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    // ---- SELECT surface ----

    /// Add a column to the select list. `table.col` is understood;
    /// expressions like `COUNT(*)` pass through verbatim.
    pub fn column(mut self, field: &str) -> Self {
        self.select_list.push(FieldSelector::parse(field));
        self.mark_dirty();
        self
    }

    pub fn from(mut self, table: &str) -> Self {
        self.from_list.push(FromSource::Table(table.to_string()));
        self.mark_dirty();
        self
    }

    /// Use a subquery as a FROM source. Its parameters register against
    /// this (outermost) query at render time.
    pub fn from_query(mut self, query: Query, alias: &str) -> Self {
        self.from_list.push(FromSource::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        });
        self.mark_dirty();
        self
    }

    pub fn join(mut self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(table, left, right, JoinKind::Inner);
        self
    }

    pub fn left_join(mut self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(table, left, right, JoinKind::Left);
        self
    }

    pub fn right_join(mut self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(table, left, right, JoinKind::Right);
        self
    }

    fn push_join(&mut self, table: &str, left: &str, right: &str, kind: JoinKind) {
        self.join_list.push(JoinClause {
            table: table.to_string(),
            left: FieldSelector::parse(left),
            right: FieldSelector::parse(right),
            kind,
        });
        self.mark_dirty();
    }

    // ---- WHERE surface ----

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.where_cmp(field, Comparer::Eq, value)
    }

    pub fn where_cmp(mut self, field: &str, comparer: Comparer, value: impl Into<Value>) -> Self {
        self.push_where(field, comparer, WhereOperand::Value(value.into()), BoolOp::And, true);
        self
    }

    pub fn or_where_cmp(
        mut self,
        field: &str,
        comparer: Comparer,
        value: impl Into<Value>,
    ) -> Self {
        self.push_where(field, comparer, WhereOperand::Value(value.into()), BoolOp::Or, true);
        self
    }

    /// Compare two fields, e.g. `orders.user_id = users.id`.
    pub fn where_field(mut self, left: &str, comparer: Comparer, right: &str) -> Self {
        self.push_where(
            left,
            comparer,
            WhereOperand::Field(FieldSelector::parse(right)),
            BoolOp::And,
            true,
        );
        self
    }

    /// Membership in a literal list. An empty list fails at render time;
    /// there is no SQL for `IN ()`.
    pub fn where_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_where(field, Comparer::Eq, WhereOperand::List(values), BoolOp::And, true);
        self
    }

    /// Membership in a subquery. The subquery's parameters land in this
    /// query's parameter table with labels that stay unique across the
    /// whole statement.
    pub fn where_in_query(mut self, field: &str, query: Query) -> Self {
        self.push_where(
            field,
            Comparer::Eq,
            WhereOperand::Subquery(Box::new(query)),
            BoolOp::And,
            true,
        );
        self
    }

    pub fn where_null(mut self, field: &str) -> Self {
        self.push_where(field, Comparer::Eq, WhereOperand::Null, BoolOp::And, true);
        self
    }

    pub fn where_not_null(mut self, field: &str) -> Self {
        self.push_where(field, Comparer::Ne, WhereOperand::Null, BoolOp::And, true);
        self
    }

    /// Compare against a raw SQL fragment the caller vouches for. The
    /// fragment is inlined verbatim in both renderings and recorded in
    /// the parameter table as unescaped.
    pub fn where_raw_cmp(mut self, field: &str, comparer: Comparer, fragment: &str) -> Self {
        self.push_where(
            field,
            comparer,
            WhereOperand::Value(Value::Text(fragment.to_string())),
            BoolOp::And,
            false,
        );
        self
    }

    fn push_where(
        &mut self,
        field: &str,
        comparer: Comparer,
        operand: WhereOperand,
        bool_op: BoolOp,
        escape: bool,
    ) {
        self.where_list.push(WhereClause {
            field: FieldSelector::parse(field),
            comparer,
            operand,
            bool_op,
            escape,
        });
        self.mark_dirty();
    }

    // ---- GROUP BY / HAVING / ORDER BY / LIMIT ----

    pub fn group_by(mut self, field: &str) -> Self {
        self.group_list.push(FieldSelector::parse(field));
        self.mark_dirty();
        self
    }

    pub fn having_cmp(mut self, field: &str, comparer: Comparer, value: impl Into<Value>) -> Self {
        self.having_list.push(WhereClause {
            field: FieldSelector::parse(field),
            comparer,
            operand: WhereOperand::Value(value.into()),
            bool_op: BoolOp::And,
            escape: true,
        });
        self.mark_dirty();
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_list.push(OrderClause {
            field: FieldSelector::parse(field),
            order,
        });
        self.mark_dirty();
        self
    }

    /// Limit to `count` rows from the start. Replaces any earlier limit.
    pub fn limit(self, count: u64) -> Self {
        self.limit_offset(count, 0)
    }

    pub fn limit_offset(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some((count, offset));
        self.mark_dirty();
        self
    }

    // ---- UPDATE / INSERT / CREATE surface ----

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set_list.push(SetClause {
            column: column.to_string(),
            value: SetValue::Value(value.into()),
        });
        self.mark_dirty();
        self
    }

    /// Assign a raw SQL fragment, e.g. `set_raw("updated_at", "NOW()")`.
    pub fn set_raw(mut self, column: &str, fragment: &str) -> Self {
        self.set_list.push(SetClause {
            column: column.to_string(),
            value: SetValue::Raw(fragment.to_string()),
        });
        self.mark_dirty();
        self
    }

    /// Add one cell to the current INSERT row, starting a row if none is
    /// open. New columns widen the column set for every row.
    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        if self.value_rows.is_empty() {
            self.value_rows.push(Vec::new());
        }
        self.note_column(column);
        if let Some(row) = self.value_rows.last_mut() {
            row.push((column.to_string(), value.into()));
        }
        self.mark_dirty();
        self
    }

    /// Append a complete INSERT row. Rows missing a cell for a column
    /// another row supplies insert NULL there; mixing rows that do and
    /// do not supply the key column leaves per-row key assignment to
    /// the engine.
    pub fn values<I, S, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let mut row = Vec::new();
        for (column, value) in pairs {
            let column = column.into();
            self.note_column(&column);
            row.push((column, value.into()));
        }
        self.value_rows.push(row);
        self.mark_dirty();
        self
    }

    fn note_column(&mut self, column: &str) {
        if !self.column_set.iter().any(|c| c == column) {
            self.column_set.push(column.to_string());
        }
    }

    pub fn add_column(mut self, name: &str, kind: DataKind) -> Self {
        self.create_list.push(ColumnDef {
            name: name.to_string(),
            kind,
            constraints: None,
        });
        self.mark_dirty();
        self
    }

    pub fn add_column_with(mut self, name: &str, kind: DataKind, constraints: &str) -> Self {
        self.create_list.push(ColumnDef {
            name: name.to_string(),
            kind,
            constraints: Some(constraints.to_string()),
        });
        self.mark_dirty();
        self
    }

    // ---- render / inspect ----

    /// Render the query if dirty, or hand back the memoized result.
    /// A clean re-render returns the same strings and the same shared
    /// parameter table.
    pub fn render(&mut self) -> QuarryResult<&Rendered> {
        if self.dirty {
            self.rendered = None;
            self.dirty = false;
        }
        if self.rendered.is_none() {
            let rendered = render::render_query(self)?;
            self.rendered = Some(rendered);
        }
        Ok(self
            .rendered
            .as_ref()
            .expect("rendered populated by the branch above"))
    }

    /// The display rendering, literals inlined. For logs and debugging;
    /// never executed.
    pub fn to_sql(&mut self) -> QuarryResult<String> {
        Ok(self.render()?.display.clone())
    }

    /// The parameterized rendering with engine placeholders.
    pub fn to_parameterized_sql(&mut self) -> QuarryResult<String> {
        Ok(self.render()?.parameterized.clone())
    }

    /// Render and package the statement an executor runs: parameterized
    /// SQL plus the escaped parameters in placeholder order.
    pub fn prepare(&mut self) -> QuarryResult<Statement> {
        let kind = self.kind;
        let rendered = self.render()?;
        Ok(Statement {
            kind,
            sql: rendered.parameterized.clone(),
            params: rendered.params.bound().cloned().collect(),
        })
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub(crate) fn error_hook(&self) -> Option<Arc<ErrorHook>> {
        self.error_hook.clone()
    }

    // Accessors used by dialects at render time.

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn select_list(&self) -> &[FieldSelector] {
        &self.select_list
    }

    pub fn from_list(&self) -> &[FromSource] {
        &self.from_list
    }

    pub fn join_list(&self) -> &[JoinClause] {
        &self.join_list
    }

    pub fn where_list(&self) -> &[WhereClause] {
        &self.where_list
    }

    pub fn having_list(&self) -> &[WhereClause] {
        &self.having_list
    }

    pub fn group_list(&self) -> &[FieldSelector] {
        &self.group_list
    }

    pub fn order_list(&self) -> &[OrderClause] {
        &self.order_list
    }

    pub fn set_list(&self) -> &[SetClause] {
        &self.set_list
    }

    pub fn column_set(&self) -> &[String] {
        &self.column_set
    }

    pub fn value_rows(&self) -> &[Vec<(String, Value)>] {
        &self.value_rows
    }

    pub fn create_list(&self) -> &[ColumnDef] {
        &self.create_list
    }

    pub fn limit_window(&self) -> Option<(u64, u64)> {
        self.limit
    }

    pub fn raw_sql(&self) -> Option<&str> {
        self.raw_sql.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;

    #[test]
    fn select_with_where_and_limit() {
        let mut q = select().from("t").where_eq("id", 5).limit(1);
        let rendered = q.render().unwrap();
        assert_eq!(rendered.display, "SELECT * FROM t WHERE id = 5 LIMIT 1 OFFSET 0");
        assert_eq!(
            rendered.parameterized,
            "SELECT * FROM t WHERE id = ? LIMIT 1 OFFSET 0"
        );
        let bound: Vec<_> = rendered.params.bound().collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].label, "prepared_value_1");
        assert_eq!(bound[0].value, Value::Int(5));
    }

    #[test]
    fn render_is_memoized_until_dirty() {
        let mut q = select().from("t").where_eq("id", 5);
        let first = q.render().unwrap().clone();
        let second = q.render().unwrap().clone();
        assert_eq!(first.parameterized, second.parameterized);
        assert!(Arc::ptr_eq(&first.params, &second.params));

        let mut q = q.limit(2);
        let third = q.render().unwrap().clone();
        assert!(third.parameterized.contains("LIMIT 2 OFFSET 0"));
        assert!(!Arc::ptr_eq(&first.params, &third.params));
    }

    #[test]
    fn mutation_dirties_a_clean_query() {
        let mut q = select().from("t");
        q.render().unwrap();
        assert!(!q.is_dirty());
        let q = q.where_eq("id", 1);
        assert!(q.is_dirty());
    }

    #[test]
    fn subquery_params_register_against_the_outer_table() {
        let inner = select()
            .column("id")
            .from("users")
            .where_eq("active", true);
        let mut q = select()
            .from("orders")
            .where_eq("status", "open")
            .where_in_query("user_id", inner)
            .where_cmp("total", Comparer::Gt, 100)
            .with_dialect(Arc::new(PostgresDialect));

        let rendered = q.render().unwrap();
        assert_eq!(
            rendered.parameterized,
            "SELECT * FROM orders WHERE status = $1 AND user_id IN \
             (SELECT id FROM users WHERE active = $2) AND total > $3"
        );
        let labels: Vec<_> = rendered.params.bound().map(|p| p.label.as_str()).collect();
        assert_eq!(
            labels,
            ["prepared_value_1", "prepared_value_2", "prepared_value_3"]
        );
    }

    #[test]
    fn subquery_as_from_source() {
        let inner = select().column("user_id").from("orders").where_eq("total", 10);
        let mut q = select().from_query(inner, "o").with_dialect(Arc::new(PostgresDialect));
        assert_eq!(
            q.to_parameterized_sql().unwrap(),
            "SELECT * FROM (SELECT user_id FROM orders WHERE total = $1) AS o"
        );
    }

    #[test]
    fn subquery_keeps_the_outer_placeholder_syntax() {
        // The inner query never had a dialect set; the outer Postgres
        // dialect must still govern every placeholder in the statement.
        let inner = select().column("id").from("users").where_eq("active", true);
        let mut q = select()
            .from("orders")
            .where_in_query("user_id", inner)
            .with_dialect(Arc::new(PostgresDialect));
        let sql = q.to_parameterized_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM orders WHERE user_id IN (SELECT id FROM users WHERE active = $1)"
        );
        assert!(!sql.contains('?'));
    }

    #[test]
    fn empty_in_list_fails_at_render_time() {
        let mut q = select().from("t").where_in("id", Vec::<i64>::new());
        let err = q.render().unwrap_err();
        assert!(matches!(err, crate::error::QuarryError::Validation(_)));
    }

    #[test]
    fn insert_fills_missing_cells_with_null() {
        let mut q = insert_into("users")
            .values([("name", Value::from("ada")), ("age", Value::from(36))])
            .values([("name", Value::from("bob"))]);
        let rendered = q.render().unwrap();
        assert_eq!(
            rendered.display,
            "INSERT INTO users (name, age) VALUES ('ada', 36), ('bob', NULL)"
        );
        assert_eq!(rendered.params.bound().count(), 4);
    }

    #[test]
    fn update_mixes_bound_and_raw_assignments() {
        let mut q = update("users")
            .set("name", "ada")
            .set_raw("updated_at", "NOW()")
            .where_eq("id", 7)
            .with_dialect(Arc::new(PostgresDialect));
        let rendered = q.render().unwrap();
        assert_eq!(
            rendered.display,
            "UPDATE users SET name = 'ada', updated_at = NOW() WHERE id = 7"
        );
        assert_eq!(
            rendered.parameterized,
            "UPDATE users SET name = $1, updated_at = NOW() WHERE id = $2"
        );
    }

    #[test]
    fn unescaped_comparison_is_inlined_but_recorded() {
        let mut q = select()
            .from("events")
            .where_raw_cmp("created_at", Comparer::Lt, "NOW()");
        let rendered = q.render().unwrap();
        assert_eq!(rendered.parameterized, "SELECT * FROM events WHERE created_at < NOW()");
        assert_eq!(rendered.params.len(), 1);
        let entry = rendered.params.get("prepared_value_1").unwrap();
        assert!(!entry.escape);
        assert_eq!(rendered.params.bound().count(), 0);
    }

    #[test]
    fn update_without_set_fails_validation() {
        let mut q = update("users").where_eq("id", 1);
        assert!(matches!(q.render(), Err(QuarryError::Validation(_))));
    }

    #[test]
    fn count_query_shape() {
        let mut q = count_from("users").where_eq("active", true);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT COUNT(*) FROM users WHERE active = TRUE"
        );
    }

    #[test]
    fn create_table_uses_dialect_type_names() {
        let mut q = create_table("events")
            .add_column_with("id", DataKind::Integer, "PRIMARY KEY")
            .add_column("payload", DataKind::Binary)
            .with_dialect(Arc::new(PostgresDialect));
        assert_eq!(
            q.to_sql().unwrap(),
            "CREATE TABLE events (id BIGINT PRIMARY KEY, payload BYTEA)"
        );
    }

    #[test]
    fn joins_group_and_having() {
        let mut q = select()
            .column("users.name")
            .column("COUNT(*)")
            .from("users")
            .join("orders", "orders.user_id", "users.id")
            .group_by("users.name")
            .having_cmp("COUNT(*)", Comparer::Gt, 3)
            .order_by("users.name", SortOrder::Asc);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT users.name, COUNT(*) FROM users \
             INNER JOIN orders ON orders.user_id = users.id \
             GROUP BY users.name HAVING COUNT(*) > 3 ORDER BY users.name ASC"
        );
    }

    #[test]
    fn null_tests_and_in_list() {
        let mut q = select()
            .from("t")
            .where_null("deleted_at")
            .where_in("id", [1, 2, 3]);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT * FROM t WHERE deleted_at IS NULL AND id IN (1, 2, 3)"
        );
    }

    #[test]
    fn raw_statement_passes_through() {
        let mut q = raw("VACUUM ANALYZE");
        assert_eq!(q.to_sql().unwrap(), "VACUUM ANALYZE");
        assert!(q.render().unwrap().params.is_empty());
    }
}
