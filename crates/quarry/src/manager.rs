//! Per-worker connection lifecycle.
//!
//! One connection slot per OS thread, keyed by [`std::thread::ThreadId`].
//! The slot map lives under a plain mutex held only for map lookups;
//! each slot has its own async mutex so a slow connect on one worker
//! never blocks another.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dialect::{self, Dialect};
use crate::error::{QuarryError, QuarryResult};
use crate::query::{self, Query};

/// A live connection the manager can health-check.
pub trait Connection: Send + Sync + 'static {
    fn is_connected(&self) -> bool;
}

/// Opens connections from a connection string.
pub trait Connect: Send + Sync {
    type Conn: Connection;

    fn connect(
        &self,
        conn_string: &str,
    ) -> impl Future<Output = QuarryResult<Self::Conn>> + Send;
}

/// Discrete connection settings, assembled into a connection string
/// when no explicit one is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionSettings {
    pub fn to_conn_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Manager configuration. One of `conn_string` or `settings` must be
/// present; construction fails otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub conn_string: Option<String>,
    pub settings: Option<ConnectionSettings>,
    /// Reconnect when a connection has outlived `renewal_interval`.
    pub auto_renew: bool,
    pub renewal_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            conn_string: None,
            settings: None,
            auto_renew: true,
            renewal_interval: Duration::from_secs(900),
        }
    }
}

struct Slot<C> {
    state: tokio::sync::Mutex<SlotState<C>>,
}

struct SlotState<C> {
    conn: Option<Arc<C>>,
    last_connect: Option<Instant>,
}

impl<C> Slot<C> {
    fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(SlotState {
                conn: None,
                last_connect: None,
            }),
        }
    }
}

/// Hands each worker thread its own lazily opened, periodically renewed
/// connection, plus a per-worker query builder seeded with the
/// manager's dialect.
pub struct ConnectionManager<F: Connect> {
    connector: F,
    config: ManagerConfig,
    conn_string: String,
    dialect: Arc<dyn Dialect>,
    workers: Mutex<HashMap<ThreadId, Arc<Slot<F::Conn>>>>,
}

impl<F: Connect> ConnectionManager<F> {
    pub fn new(config: ManagerConfig, connector: F) -> QuarryResult<Self> {
        let conn_string = match (&config.conn_string, &config.settings) {
            (Some(conn_string), _) => conn_string.clone(),
            (None, Some(settings)) => settings.to_conn_string(),
            (None, None) => {
                return Err(QuarryError::connection(
                    "neither a connection string nor connection settings are configured",
                ));
            }
        };
        Ok(Self {
            connector,
            config,
            conn_string,
            dialect: dialect::ansi(),
            workers: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// The calling worker's connection, opened or renewed as needed.
    pub async fn get_for_current_worker(&self) -> QuarryResult<Arc<F::Conn>> {
        let slot = {
            let mut workers = self.workers.lock().unwrap();
            workers
                .entry(thread::current().id())
                .or_insert_with(|| Arc::new(Slot::new()))
                .clone()
        };
        self.open(&slot).await
    }

    /// A connection outside the per-worker map, for one-off work that
    /// must not disturb the worker's slot.
    pub async fn get_detached(&self) -> QuarryResult<Arc<F::Conn>> {
        self.open(&Slot::new()).await
    }

    async fn open(&self, slot: &Slot<F::Conn>) -> QuarryResult<Arc<F::Conn>> {
        let mut state = slot.state.lock().await;
        let expired = match state.last_connect {
            Some(at) => self.config.auto_renew && at.elapsed() >= self.config.renewal_interval,
            None => false,
        };
        let dead = match &state.conn {
            Some(conn) => !conn.is_connected(),
            None => true,
        };
        if dead || expired {
            let conn = self.connector.connect(&self.conn_string).await?;
            state.conn = Some(Arc::new(conn));
            state.last_connect = Some(Instant::now());
        }
        Ok(state
            .conn
            .as_ref()
            .expect("slot populated by the branch above")
            .clone())
    }

    /// A fresh query builder carrying the manager's dialect.
    pub fn builder_for_current_worker(&self) -> Query {
        query::select().with_dialect(self.dialect.clone())
    }

    /// Drop the calling worker's slot; the next request reconnects.
    pub fn remove_current_worker(&self) {
        self.workers
            .lock()
            .unwrap()
            .remove(&thread::current().id());
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }
}
