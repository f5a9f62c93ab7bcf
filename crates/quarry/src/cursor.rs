//! Incremental result iteration: keyset and offset cursors, plus a
//! `Stream` adapter.
//!
//! A cursor clones the query it was built from; the original stays
//! untouched and reusable. Batches are fetched on demand, so dropping a
//! cursor mid-iteration simply stops issuing queries.

use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::QuarryResult;
use crate::executor::Executor;
use crate::query::{Comparer, Query};
use crate::row::{FromRow, Row};
use crate::value::Value;

const DEFAULT_BATCH_SIZE: u64 = 100;

/// Pages through results by strictly-increasing key, immune to the row
/// drift that breaks offset pagination under concurrent writes.
///
/// Each batch asks for `key > last seen key` with a LIMIT; rows arriving
/// out of order are tolerated (the watermark only moves forward), but a
/// row whose key cell is missing or non-numeric ends iteration without
/// yielding that row.
pub struct KeysetCursor<'a, E: Executor> {
    executor: &'a E,
    base: Query,
    key_field: String,
    last_seen: i64,
    batch_size: u64,
    buffer: VecDeque<Row>,
    done: bool,
}

impl<'a, E: Executor> KeysetCursor<'a, E> {
    pub fn new(query: &Query, key_field: &str, executor: &'a E) -> Self {
        Self {
            executor,
            base: query.clone(),
            key_field: key_field.to_string(),
            last_seen: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Start after `key` instead of after 0.
    pub fn starting_after(mut self, key: i64) -> Self {
        self.last_seen = key;
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The next row, fetching a fresh batch when the buffer runs dry.
    /// `Ok(None)` means iteration is over; a fetch error ends iteration
    /// and propagates.
    pub async fn try_next(&mut self) -> QuarryResult<Option<Row>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(row) = self.buffer.pop_front() {
                match row.get(&self.key_field).and_then(Value::as_key_i64) {
                    Some(key) => {
                        self.last_seen = self.last_seen.max(key);
                        return Ok(Some(row));
                    }
                    None => {
                        self.done = true;
                        self.buffer.clear();
                        return Ok(None);
                    }
                }
            }
            let mut probe = self
                .base
                .clone()
                .where_cmp(&self.key_field, Comparer::Gt, self.last_seen)
                .limit(self.batch_size);
            let rows = match probe.rows(self.executor).await {
                Ok(rows) => rows,
                Err(error) => {
                    self.done = true;
                    return Err(error);
                }
            };
            if rows.is_empty() {
                self.done = true;
                return Ok(None);
            }
            self.buffer.extend(rows);
        }
    }

    /// Like [`KeysetCursor::try_next`], mapped into `T`.
    pub async fn try_next_as<T: FromRow>(&mut self) -> QuarryResult<Option<T>> {
        match self.try_next().await? {
            Some(row) => T::from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Drain the cursor into a vector.
    pub async fn collect_rows(&mut self) -> QuarryResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.try_next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Adapt the cursor into a [`Stream`] of mapped records.
    pub fn into_stream<T: FromRow>(self) -> CursorStream<'a, E, T> {
        CursorStream {
            state: StreamState::Idle(self),
            _marker: PhantomData,
        }
    }
}

/// Plain LIMIT/OFFSET pagination, for result sets with no usable key.
/// Subject to drift if rows are inserted or deleted while iterating.
pub struct OffsetCursor<'a, E: Executor> {
    executor: &'a E,
    base: Query,
    offset: u64,
    batch_size: u64,
    buffer: VecDeque<Row>,
    done: bool,
}

impl<'a, E: Executor> OffsetCursor<'a, E> {
    pub fn new(query: &Query, executor: &'a E) -> Self {
        Self {
            executor,
            base: query.clone(),
            offset: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn try_next(&mut self) -> QuarryResult<Option<Row>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let mut probe = self
                .base
                .clone()
                .limit_offset(self.batch_size, self.offset);
            let rows = match probe.rows(self.executor).await {
                Ok(rows) => rows,
                Err(error) => {
                    self.done = true;
                    return Err(error);
                }
            };
            if rows.is_empty() {
                self.done = true;
                return Ok(None);
            }
            self.offset += rows.len() as u64;
            self.buffer.extend(rows);
        }
    }

    pub async fn try_next_as<T: FromRow>(&mut self) -> QuarryResult<Option<T>> {
        match self.try_next().await? {
            Some(row) => T::from_row(&row).map(Some),
            None => Ok(None),
        }
    }
}

impl Query {
    /// Iterate this query's results by keyset on `key_field`. The query
    /// itself is cloned and left untouched.
    pub fn iterate<'a, E: Executor>(&self, executor: &'a E, key_field: &str) -> KeysetCursor<'a, E> {
        KeysetCursor::new(self, key_field, executor)
    }

    /// Iterate by LIMIT/OFFSET windows.
    pub fn iterate_by_offset<'a, E: Executor>(&self, executor: &'a E) -> OffsetCursor<'a, E> {
        OffsetCursor::new(self, executor)
    }
}

type CursorFuture<'a, E> =
    Pin<Box<dyn Future<Output = (KeysetCursor<'a, E>, QuarryResult<Option<Row>>)> + Send + 'a>>;

enum StreamState<'a, E: Executor> {
    Idle(KeysetCursor<'a, E>),
    Pending(CursorFuture<'a, E>),
    Done,
}

/// A [`Stream`] over a keyset cursor's mapped records. Ends after the
/// first error.
pub struct CursorStream<'a, E: Executor, T> {
    state: StreamState<'a, E>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, E, T> Stream for CursorStream<'a, E, T>
where
    E: Executor + Sync + 'a,
    T: FromRow,
{
    type Item = QuarryResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // No self-referential fields; the boxed future keeps the state Unpin.
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, StreamState::Done) {
                StreamState::Idle(mut cursor) => {
                    this.state = StreamState::Pending(Box::pin(async move {
                        let item = cursor.try_next().await;
                        (cursor, item)
                    }));
                }
                StreamState::Pending(mut future) => match future.as_mut().poll(cx) {
                    Poll::Ready((cursor, Ok(Some(row)))) => {
                        this.state = StreamState::Idle(cursor);
                        return Poll::Ready(Some(T::from_row(&row)));
                    }
                    Poll::Ready((_, Ok(None))) => {
                        return Poll::Ready(None);
                    }
                    Poll::Ready((_, Err(error))) => {
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Pending => {
                        this.state = StreamState::Pending(future);
                        return Poll::Pending;
                    }
                },
                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;
    use crate::query::select;
    use crate::testing::{MockExecutor, id_row};
    use crate::value::Value;

    #[tokio::test]
    async fn keyset_pages_through_sparse_keys() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![id_row(1), id_row(2)]);
        exec.push_rows(vec![id_row(3), id_row(5)]);
        exec.push_rows(vec![id_row(8)]);
        // queue exhausted afterwards: empty batch ends iteration

        let q = select().from("t");
        let mut cursor = q.iterate(&exec, "id").batch_size(2);
        let rows = cursor.collect_rows().await.unwrap();
        let keys: Vec<i64> = rows
            .iter()
            .map(|r| r.try_get::<i64>("id").unwrap())
            .collect();
        assert_eq!(keys, [1, 2, 3, 5, 8]);

        // each batch filters past the last seen key
        let sql: Vec<String> = exec.statements().iter().map(|s| s.sql.clone()).collect();
        assert!(sql.iter().all(|s| s.contains("id > ?")));
        assert!(sql.iter().all(|s| s.contains("LIMIT 2 OFFSET 0")));
        let watermarks: Vec<Value> = exec
            .statements()
            .iter()
            .map(|s| s.params[0].value.clone())
            .collect();
        assert_eq!(
            watermarks,
            [Value::Int(0), Value::Int(2), Value::Int(5), Value::Int(8)]
        );
    }

    #[tokio::test]
    async fn keyset_leaves_the_source_query_untouched() {
        let exec = MockExecutor::new();
        let mut q = select().from("t");
        let before = q.to_parameterized_sql().unwrap();
        let mut cursor = q.iterate(&exec, "id");
        assert!(cursor.try_next().await.unwrap().is_none());
        assert_eq!(q.to_parameterized_sql().unwrap(), before);
    }

    #[tokio::test]
    async fn unparsable_key_ends_without_yielding() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![
            id_row(1),
            Row::from_pairs([("id", Value::Text("not-a-key".into()))]),
        ]);
        let q = select().from("t");
        let mut cursor = q.iterate(&exec, "id");
        assert!(cursor.try_next().await.unwrap().is_some());
        assert!(cursor.try_next().await.unwrap().is_none());
        // iteration is over for good
        assert!(cursor.try_next().await.unwrap().is_none());
        assert_eq!(exec.statement_count(), 1);
    }

    #[tokio::test]
    async fn fetch_error_propagates_and_ends_iteration() {
        let exec = MockExecutor::new();
        exec.push_error(crate::error::QuarryError::execution("gone"));
        let q = select().from("t");
        let mut cursor = q.iterate(&exec, "id");
        assert!(cursor.try_next().await.is_err());
        assert!(cursor.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decreasing_keys_never_move_the_watermark_back() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![id_row(10), id_row(4)]);
        let q = select().from("t");
        let mut cursor = q.iterate(&exec, "id").batch_size(2);
        cursor.try_next().await.unwrap();
        cursor.try_next().await.unwrap();
        assert!(cursor.try_next().await.unwrap().is_none());
        let watermarks: Vec<Value> = exec
            .statements()
            .iter()
            .map(|s| s.params[0].value.clone())
            .collect();
        assert_eq!(watermarks, [Value::Int(0), Value::Int(10)]);
    }

    #[tokio::test]
    async fn offset_cursor_advances_windows() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![id_row(1), id_row(2)]);
        exec.push_rows(vec![id_row(3)]);
        let q = select().from("t");
        let mut cursor = q.iterate_by_offset(&exec).batch_size(2);
        let mut seen = Vec::new();
        while let Some(row) = cursor.try_next().await.unwrap() {
            seen.push(row.try_get::<i64>("id").unwrap());
        }
        assert_eq!(seen, [1, 2, 3]);
        let sql: Vec<String> = exec.statements().iter().map(|s| s.sql.clone()).collect();
        assert!(sql[0].contains("LIMIT 2 OFFSET 0"));
        assert!(sql[1].contains("LIMIT 2 OFFSET 2"));
    }

    #[tokio::test]
    async fn cursor_stream_yields_mapped_records() {
        let exec = MockExecutor::new();
        exec.push_rows(vec![id_row(1), id_row(2)]);
        exec.push_rows(vec![id_row(3)]);
        let q = select().from("t");
        let stream = q.iterate(&exec, "id").batch_size(2).into_stream::<Row>();
        let rows: Vec<Row> = stream.try_collect().await.unwrap();
        assert_eq!(rows.len(), 3);
    }
}
