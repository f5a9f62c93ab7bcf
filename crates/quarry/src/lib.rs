//! quarry: an engine-agnostic SQL construction and execution layer.
//!
//! Queries are built as mutable clause models and rendered lazily into
//! two forms: display SQL with literals inlined, and parameterized SQL
//! with a labeled parameter table. Rendering goes through a pluggable
//! [`Dialect`]; execution goes through a pluggable [`Executor`].
//!
//! ```no_run
//! use quarry::{select, Comparer};
//!
//! # async fn demo(client: tokio_postgres::Client) -> quarry::QuarryResult<()> {
//! let mut query = select()
//!     .from("users")
//!     .where_cmp("age", Comparer::Gte, 18)
//!     .limit(20);
//! let rows = query.rows(&client).await?;
//! # Ok(())
//! # }
//! ```
//!
//! On top of the core sit a change tracker ([`RowTracker`]) that turns
//! snapshots into diff-only UPDATEs, keyset and offset cursors for
//! incremental iteration, a per-worker [`ConnectionManager`], and
//! [`TransactionScope`] for savepoint-aware transaction control.

pub mod cursor;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod manager;
pub mod observe;
pub mod postgres;
pub mod query;
pub mod row;
pub mod tracker;
pub mod transaction;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::{CursorStream, KeysetCursor, OffsetCursor};
pub use dialect::{AnsiDialect, ClauseGroup, Dialect, PostgresDialect, TxOp};
pub use error::{QuarryError, QuarryResult};
pub use executor::{ExecOutcome, Executor, OutcomeValue, Statement};
pub use manager::{Connect, Connection, ConnectionManager, ConnectionSettings, ManagerConfig};
pub use observe::{ExecHook, InstrumentedExecutor, NoopHook};
#[cfg(feature = "tracing")]
pub use observe::TracingHook;
pub use postgres::{PgConnection, PgConnector};
#[cfg(feature = "pool")]
pub use postgres::create_pool;
pub use query::{
    Comparer, ParamEntry, ParamTable, Query, RenderCtx, RenderMode, Rendered, SortOrder,
    StatementKind, count_from, create_table, delete_from, insert_into, raw, select, update,
};
pub use row::{FromRow, Model, Row};
pub use tracker::{RowTracker, TrackerConfig, fetch_all_tracked};
pub use transaction::TransactionScope;
pub use value::{DataKind, EnumLabel, FromValue, Value};
