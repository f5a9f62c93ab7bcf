//! Change tracking: snapshots of fetched records with TTL eviction and
//! diff-only UPDATE statements.
//!
//! A tracked record is identified by `(table, key value)`. Two instances
//! carrying the same key are the same tracked row; tracking the second
//! replaces the first's snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dialect::{self, Dialect};
use crate::error::QuarryResult;
use crate::executor::Executor;
use crate::query::{self, Query};
use crate::row::Model;
use crate::value::Value;

/// TTL policy for tracked snapshots.
///
/// The sliding window resets every time an entry is read or written;
/// the absolute window starts at first track and is never extended.
/// Whichever expires first evicts the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub sliding_ttl: Duration,
    pub absolute_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sliding_ttl: Duration::from_secs(900),
            absolute_ttl: Duration::from_secs(3600),
        }
    }
}

struct Entry {
    key_column: &'static str,
    key_value: Value,
    snapshot: Vec<(&'static str, Value)>,
    touched: Instant,
    created: Instant,
}

type Identity = (&'static str, Value);

/// The snapshot cache. Expired entries are purged lazily, on the next
/// access; there is no background task.
pub struct RowTracker {
    config: TrackerConfig,
    dialect: Arc<dyn Dialect>,
    entries: Mutex<HashMap<Identity, Entry>>,
}

impl Default for RowTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl RowTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            dialect: dialect::ansi(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Render write-backs with `dialect` instead of the ANSI default.
    /// A tracker writing through a Postgres executor needs this, or its
    /// UPDATEs carry the wrong placeholders.
    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Snapshot `record` for later diffing. A record already tracked
    /// under the same key gets its snapshot replaced and both TTL
    /// windows restarted.
    pub fn track<M: Model>(&self, record: &M) {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap();
        purge(&mut map, &self.config, now);
        map.insert(
            (M::TABLE, record.key_value()),
            Entry {
                key_column: M::key_column(),
                key_value: record.key_value(),
                snapshot: record.snapshot(),
                touched: now,
                created: now,
            },
        );
    }

    /// Whether `record` is still tracked. Reading an entry resets its
    /// sliding window.
    pub fn contains<M: Model>(&self, record: &M) -> bool {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap();
        purge(&mut map, &self.config, now);
        match map.get_mut(&(M::TABLE, record.key_value())) {
            Some(entry) => {
                entry.touched = now;
                true
            }
            None => false,
        }
    }

    pub fn forget<M: Model>(&self, record: &M) {
        self.entries
            .lock()
            .unwrap()
            .remove(&(M::TABLE, record.key_value()));
    }

    pub fn len(&self) -> usize {
        let mut map = self.entries.lock().unwrap();
        purge(&mut map, &self.config, Instant::now());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write back only what changed since the snapshot.
    ///
    /// Returns `Ok(false)` without touching the engine when the record
    /// is not tracked (or expired), when nothing changed, or when the
    /// snapshot's key is null or empty; a record that lost its key
    /// never turns into an unfiltered UPDATE. On a successful write the
    /// snapshot is refreshed, so an immediately repeated call is a
    /// no-op.
    pub async fn update<M, E>(&self, record: &M, executor: &E) -> QuarryResult<bool>
    where
        M: Model,
        E: Executor,
    {
        let current = record.snapshot();
        let (key_column, key_value, diff) = {
            let now = Instant::now();
            let mut map = self.entries.lock().unwrap();
            purge(&mut map, &self.config, now);
            let Some(entry) = map.get_mut(&(M::TABLE, record.key_value())) else {
                return Ok(false);
            };
            entry.touched = now;
            if entry.key_value.is_null_or_empty() {
                return Ok(false);
            }
            let diff: Vec<(&'static str, Value)> = current
                .iter()
                .filter(|(column, value)| {
                    entry
                        .snapshot
                        .iter()
                        .find(|(snap_column, _)| snap_column == column)
                        .map(|(_, snap_value)| snap_value != value)
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            if diff.is_empty() {
                return Ok(false);
            }
            (entry.key_column, entry.key_value.clone(), diff)
        };

        let mut statement = query::update(M::TABLE).with_dialect(self.dialect.clone());
        for (column, value) in &diff {
            statement = statement.set(column, value.clone());
        }
        let mut statement = statement.where_eq(key_column, key_value);
        let affected = statement.execute(executor).await?;

        if affected > 0 {
            let mut map = self.entries.lock().unwrap();
            if let Some(entry) = map.get_mut(&(M::TABLE, record.key_value())) {
                entry.snapshot = current;
                entry.touched = Instant::now();
            }
        }
        Ok(affected > 0)
    }
}

fn purge(map: &mut HashMap<Identity, Entry>, config: &TrackerConfig, now: Instant) {
    map.retain(|_, entry| {
        now.duration_since(entry.touched) < config.sliding_ttl
            && now.duration_since(entry.created) < config.absolute_ttl
    });
}

/// Fetch records and track each one in a single step.
pub async fn fetch_all_tracked<M, E>(
    query: &mut Query,
    executor: &E,
    tracker: &RowTracker,
) -> QuarryResult<Vec<M>>
where
    M: Model,
    E: Executor,
{
    let records: Vec<M> = query.fetch_all(executor).await?;
    for record in &records {
        tracker.track(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryResult;
    use crate::query::select;
    use crate::row::{FromRow, Row};
    use crate::testing::MockExecutor;

    #[derive(Debug, Clone)]
    struct User {
        id: Option<i64>,
        name: String,
        age: i64,
    }

    impl FromRow for User {
        fn from_row(row: &Row) -> QuarryResult<Self> {
            Ok(Self {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                age: row.try_get("age")?,
            })
        }
    }

    impl Model for User {
        const TABLE: &'static str = "users";

        fn key_column() -> &'static str {
            "id"
        }

        fn columns() -> &'static [&'static str] {
            &["id", "name", "age"]
        }

        fn snapshot(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", Value::from(self.id)),
                ("name", Value::from(self.name.as_str())),
                ("age", Value::from(self.age)),
            ]
        }
    }

    fn ada() -> User {
        User {
            id: Some(7),
            name: "ada".into(),
            age: 36,
        }
    }

    #[tokio::test]
    async fn update_writes_only_the_diff() {
        let exec = MockExecutor::new();
        exec.push_affected(1);
        let tracker = RowTracker::default();

        let mut user = ada();
        tracker.track(&user);
        user.name = "ada lovelace".into();

        assert!(tracker.update(&user, &exec).await.unwrap());
        let statements = exec.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "UPDATE users SET name = ? WHERE id = ?");
        let values: Vec<_> = statements[0].values().cloned().collect();
        assert_eq!(
            values,
            [Value::Text("ada lovelace".into()), Value::Int(7)]
        );
    }

    #[tokio::test]
    async fn update_renders_with_the_configured_dialect() {
        let exec = MockExecutor::new();
        exec.push_affected(1);
        let tracker = RowTracker::default().with_dialect(Arc::new(crate::dialect::PostgresDialect));

        let mut user = ada();
        tracker.track(&user);
        user.name = "ada lovelace".into();

        assert!(tracker.update(&user, &exec).await.unwrap());
        assert_eq!(
            exec.statements()[0].sql,
            "UPDATE users SET name = $1 WHERE id = $2"
        );
    }

    #[tokio::test]
    async fn repeated_update_is_a_no_op() {
        let exec = MockExecutor::new();
        exec.push_affected(1);
        let tracker = RowTracker::default();

        let mut user = ada();
        tracker.track(&user);
        user.age = 37;

        assert!(tracker.update(&user, &exec).await.unwrap());
        assert!(!tracker.update(&user, &exec).await.unwrap());
        assert_eq!(exec.statement_count(), 1);
    }

    #[tokio::test]
    async fn unchanged_record_issues_nothing() {
        let exec = MockExecutor::new();
        let tracker = RowTracker::default();
        let user = ada();
        tracker.track(&user);
        assert!(!tracker.update(&user, &exec).await.unwrap());
        assert_eq!(exec.statement_count(), 0);
    }

    #[tokio::test]
    async fn untracked_record_is_skipped() {
        let exec = MockExecutor::new();
        let tracker = RowTracker::default();
        let user = ada();
        assert!(!tracker.update(&user, &exec).await.unwrap());
        assert_eq!(exec.statement_count(), 0);
    }

    #[tokio::test]
    async fn null_key_fails_closed() {
        let exec = MockExecutor::new();
        let tracker = RowTracker::default();
        let mut user = ada();
        user.id = None;
        tracker.track(&user);
        user.name = "changed".into();
        assert!(!tracker.update(&user, &exec).await.unwrap());
        assert_eq!(exec.statement_count(), 0);
    }

    #[test]
    fn absolute_ttl_evicts() {
        let tracker = RowTracker::new(TrackerConfig {
            sliding_ttl: Duration::from_secs(900),
            absolute_ttl: Duration::ZERO,
        });
        let user = ada();
        tracker.track(&user);
        assert!(!tracker.contains(&user));
        assert!(tracker.is_empty());
    }

    #[test]
    fn sliding_ttl_evicts() {
        let tracker = RowTracker::new(TrackerConfig {
            sliding_ttl: Duration::ZERO,
            absolute_ttl: Duration::from_secs(3600),
        });
        let user = ada();
        tracker.track(&user);
        assert!(!tracker.contains(&user));
    }

    #[tokio::test]
    async fn fetch_all_tracked_snapshots_each_row() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![
            Row::from_pairs([
                ("id", Value::Int(1)),
                ("name", Value::Text("a".into())),
                ("age", Value::Int(30)),
            ]),
            Row::from_pairs([
                ("id", Value::Int(2)),
                ("name", Value::Text("b".into())),
                ("age", Value::Int(40)),
            ]),
        ]);
        let tracker = RowTracker::default();
        let mut q = select().from("users");
        let users: Vec<User> = fetch_all_tracked(&mut q, &exec, &tracker).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(tracker.len(), 2);
    }
}
