//! PostgreSQL bindings: executors for `tokio_postgres` clients and
//! transactions, a connector for the connection manager, and pool
//! helpers behind the `pool` feature.

use std::future::Future;

use bytes::BytesMut;
use tokio_postgres::NoTls;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use crate::error::{QuarryError, QuarryResult};
use crate::executor::{ExecOutcome, Executor, Statement};
use crate::manager::{Connect, Connection};
use crate::query::StatementKind;
use crate::row::Row;
use crate::value::Value;

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => {
                // Narrow to the column's width; a value outside the
                // column's range is an error, never a silent wrap.
                if *ty == Type::INT2 {
                    let narrow = i16::try_from(*v)
                        .map_err(|_| format!("integer {v} out of range for INT2"))?;
                    narrow.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    let narrow = i32::try_from(*v)
                        .map_err(|_| format!("integer {v} out of range for INT4"))?;
                    narrow.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Float(v) => {
                if *ty == Type::FLOAT4 {
                    let narrow = *v as f32;
                    if v.is_finite() && !narrow.is_finite() {
                        return Err(format!("float {v} out of range for FLOAT4").into());
                    }
                    narrow.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn convert_cell(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
    name: &str,
) -> QuarryResult<Value> {
    fn get<'r, T>(row: &'r tokio_postgres::Row, idx: usize, name: &str) -> QuarryResult<Option<T>>
    where
        T: tokio_postgres::types::FromSql<'r>,
    {
        row.try_get(idx)
            .map_err(|e| QuarryError::decode(name, e.to_string()))
    }

    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx, name)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx, name)?.map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx, name)?.map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx, name)?.map(Value::Int)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx, name)?.map(|v| Value::Float(v as f64))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx, name)?.map(Value::Float)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        get::<String>(row, idx, name)?.map(Value::Text)
    } else if *ty == Type::BYTEA {
        get::<Vec<u8>>(row, idx, name)?.map(Value::Bytes)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<chrono::DateTime<chrono::Utc>>(row, idx, name)?.map(Value::Timestamp)
    } else if *ty == Type::TIMESTAMP {
        get::<chrono::NaiveDateTime>(row, idx, name)?.map(|v| Value::Timestamp(v.and_utc()))
    } else if *ty == Type::UUID {
        get::<uuid::Uuid>(row, idx, name)?.map(|v| Value::Text(v.to_string()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<serde_json::Value>(row, idx, name)?.map(|v| Value::Text(v.to_string()))
    } else {
        return Err(QuarryError::unmapped(format!(
            "column '{name}' of type {ty}"
        )));
    };
    Ok(value.unwrap_or(Value::Null))
}

fn convert_row(row: &tokio_postgres::Row) -> QuarryResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        out.push(name, convert_cell(row, idx, column.type_(), name)?);
    }
    Ok(out)
}

// Send-bounded facade over the driver's query surface; the driver's own
// GenericClient futures carry no Send bound.
trait PgClient: Sync {
    fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<tokio_postgres::Row>, tokio_postgres::Error>> + Send;

    fn execute_sql(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send;
}

impl PgClient for tokio_postgres::Client {
    async fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, tokio_postgres::Error> {
        self.query(sql, params).await
    }

    async fn execute_sql(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, tokio_postgres::Error> {
        self.execute(sql, params).await
    }
}

impl PgClient for tokio_postgres::Transaction<'_> {
    async fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, tokio_postgres::Error> {
        self.query(sql, params).await
    }

    async fn execute_sql(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, tokio_postgres::Error> {
        self.execute(sql, params).await
    }
}

async fn run_statement<C>(client: &C, statement: &Statement) -> QuarryResult<ExecOutcome>
where
    C: PgClient,
{
    let params: Vec<&(dyn ToSql + Sync)> = statement
        .params
        .iter()
        .map(|p| &p.value as &(dyn ToSql + Sync))
        .collect();
    match statement.kind {
        StatementKind::Select | StatementKind::Count => {
            let pg_rows = client.query_rows(&statement.sql, &params).await?;
            let mut rows = Vec::with_capacity(pg_rows.len());
            for row in &pg_rows {
                rows.push(convert_row(row)?);
            }
            let affected = rows.len() as u64;
            Ok(ExecOutcome {
                rows,
                affected,
                last_insert_id: None,
            })
        }
        _ => {
            // Postgres reports no engine-assigned key without RETURNING,
            // which the query model does not emit.
            let affected = client.execute_sql(&statement.sql, &params).await?;
            Ok(ExecOutcome {
                rows: Vec::new(),
                affected,
                last_insert_id: None,
            })
        }
    }
}

impl Executor for tokio_postgres::Client {
    async fn run(&self, statement: &Statement) -> QuarryResult<ExecOutcome> {
        run_statement(self, statement).await
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn run(&self, statement: &Statement) -> QuarryResult<ExecOutcome> {
        run_statement(self, statement).await
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    async fn run(&self, statement: &Statement) -> QuarryResult<ExecOutcome> {
        let client: &tokio_postgres::Client = self;
        run_statement(client, statement).await
    }
}

/// A managed connection: the client plus liveness for the manager.
pub struct PgConnection {
    client: tokio_postgres::Client,
}

impl PgConnection {
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

impl Connection for PgConnection {
    fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }
}

impl Executor for PgConnection {
    async fn run(&self, statement: &Statement) -> QuarryResult<ExecOutcome> {
        run_statement(&self.client, statement).await
    }
}

/// Opens plaintext connections and drives each connection task in the
/// background.
pub struct PgConnector;

impl Connect for PgConnector {
    type Conn = PgConnection;

    async fn connect(&self, conn_string: &str) -> QuarryResult<PgConnection> {
        let (client, connection) = tokio_postgres::connect(conn_string, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                #[cfg(feature = "tracing")]
                tracing::warn!(target: "quarry::postgres", error = %e, "connection task ended");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
            }
        });
        Ok(PgConnection { client })
    }
}

/// Create a deadpool-backed pool from a connection URL.
#[cfg(feature = "pool")]
pub fn create_pool(conn_string: &str, max_size: usize) -> QuarryResult<deadpool_postgres::Pool> {
    let mut config = deadpool_postgres::Config::new();
    config.url = Some(conn_string.to_string());
    config.pool = Some(deadpool_postgres::PoolConfig::new(max_size));
    Ok(config.create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_binds_as_sql_null() {
        let mut buf = BytesMut::new();
        let result = Value::Null.to_sql(&Type::INT8, &mut buf).unwrap();
        assert!(matches!(result, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn int_narrows_to_column_width() {
        let mut wide = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT8, &mut wide).unwrap();
        assert_eq!(wide.len(), 8);

        let mut narrow = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT4, &mut narrow).unwrap();
        assert_eq!(narrow.len(), 4);
    }

    #[test]
    fn int_out_of_column_range_is_an_error() {
        let mut buf = BytesMut::new();
        let err = Value::Int(70_000).to_sql(&Type::INT2, &mut buf).err().unwrap();
        assert!(err.to_string().contains("out of range"));

        let mut buf = BytesMut::new();
        let err = Value::Int(i64::from(i32::MAX) + 1)
            .to_sql(&Type::INT4, &mut buf)
            .err()
            .unwrap();
        assert!(err.to_string().contains("out of range"));

        let mut buf = BytesMut::new();
        Value::Int(70_000).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn float_overflowing_float4_is_an_error() {
        let mut buf = BytesMut::new();
        let err = Value::Float(1e300).to_sql(&Type::FLOAT4, &mut buf).err().unwrap();
        assert!(err.to_string().contains("out of range"));

        let mut buf = BytesMut::new();
        Value::Float(1.5).to_sql(&Type::FLOAT4, &mut buf).unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn text_binds_as_utf8() {
        let mut buf = BytesMut::new();
        Value::Text("ada".into()).to_sql(&Type::TEXT, &mut buf).unwrap();
        assert_eq!(&buf[..], b"ada");
    }
}
