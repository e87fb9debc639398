//! Pull-based cursor over one open statement.
//!
//! The statement borrows its connection, so each cursor runs on a dedicated
//! worker thread that owns the connection for the cursor's lifetime:
//! - Fetch requests travel over a tokio mpsc channel, each carrying a oneshot
//!   for its reply
//! - Hanging up the request channel ends the worker, which hands the
//!   connection back to its provider before `close()` returns
//!
//! Cursor calls block the calling thread. From async code, drive cursors
//! inside `tokio::task::spawn_blocking`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use super::provider::{ConnectionGuard, ConnectionProvider};
use super::row::Row;
use super::schema::{Query, TableSchema};
use crate::error::StreamError;
use crate::observability::metrics::{record_cursor_closed, record_cursor_opened};

/// Upper bound on the rows pre-allocated for one fetch.
const MAX_PREALLOC: usize = 1024;

/// Lifecycle of a [`RowCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    /// The result set has been fully read; the connection is still held.
    Exhausted,
    /// The connection has been released. Fetching fails with `ClosedCursor`.
    Closed,
}

/// One request to the worker: up to `limit` rows, answered on `reply`.
struct Fetch {
    limit: usize,
    reply: oneshot::Sender<Result<Vec<Row>, StreamError>>,
}

struct Worker {
    requests: mpsc::Sender<Fetch>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// A closed channel in either direction means the worker is gone.
    fn fetch(&self, limit: usize) -> Result<Vec<Row>, StreamError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .blocking_send(Fetch { limit, reply })
            .map_err(|_| StreamError::WorkerPanic)?;
        response.blocking_recv().map_err(|_| StreamError::WorkerPanic)?
    }
}

/// Handle over one open query result.
pub struct RowCursor {
    state: CursorState,
    table: String,
    fetched: u64,
    worker: Option<Worker>,
}

impl RowCursor {
    /// Open `SELECT <columns> FROM <table> ORDER BY <order_column>`.
    pub fn open<P: ConnectionProvider>(
        provider: &Arc<P>,
        schema: &TableSchema,
        order_column: &str,
    ) -> Result<Self, StreamError> {
        let query = schema.ordered_scan(order_column)?;
        Self::open_query(provider, Arc::new(query))
    }

    /// Open a cursor over an already rendered query.
    ///
    /// Blocks until the connection is open and the statement is executing, so
    /// connection and SQL errors surface here rather than on the first fetch.
    pub fn open_query<P: ConnectionProvider>(
        provider: &Arc<P>,
        query: Arc<Query>,
    ) -> Result<Self, StreamError> {
        let (request_tx, request_rx) = mpsc::channel::<Fetch>(1);
        let (ready_tx, ready_rx) = oneshot::channel();

        let table = query.table().to_string();
        let worker_provider = Arc::clone(provider);
        let handle = thread::Builder::new()
            .name("tablestream-cursor".into())
            .spawn(move || run_worker(&*worker_provider, &query, ready_tx, request_rx))
            .map_err(StreamError::Spawn)?;

        let mut cursor = Self {
            state: CursorState::Open,
            table,
            fetched: 0,
            worker: Some(Worker {
                requests: request_tx,
                handle,
            }),
        };

        match ready_rx.blocking_recv() {
            Ok(Ok(())) => {
                record_cursor_opened(&cursor.table);
                tracing::debug!(table = %cursor.table, "Cursor opened");
                Ok(cursor)
            }
            Ok(Err(e)) => {
                cursor.abandon();
                Err(e)
            }
            Err(_) => {
                cursor.abandon();
                Err(StreamError::WorkerPanic)
            }
        }
    }

    /// Tear down a cursor that never finished opening.
    fn abandon(&mut self) {
        self.state = CursorState::Closed;
        self.close();
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Rows handed out so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Next row, or `None` once the result set is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>, StreamError> {
        Ok(self.fetch_many(1)?.pop())
    }

    /// Up to `n` rows; fewer only at exhaustion.
    ///
    /// On error the cursor is closed before the error is returned.
    pub fn fetch_many(&mut self, n: usize) -> Result<Vec<Row>, StreamError> {
        match self.state {
            CursorState::Closed => return Err(StreamError::ClosedCursor),
            CursorState::Exhausted => return Ok(Vec::new()),
            CursorState::Open => {}
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let reply = match &self.worker {
            Some(worker) => worker.fetch(n),
            None => Err(StreamError::ClosedCursor),
        };

        match reply {
            Ok(rows) => {
                if rows.len() < n {
                    self.state = CursorState::Exhausted;
                }
                self.fetched += rows.len() as u64;
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "Cursor fetch failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Release the statement and connection. Idempotent.
    pub fn close(&mut self) {
        let Some(Worker { requests, handle }) = self.worker.take() else {
            self.state = CursorState::Closed;
            return;
        };

        let was_open = self.state != CursorState::Closed;
        self.state = CursorState::Closed;

        // Hanging up ends the worker's request loop.
        drop(requests);
        if handle.join().is_err() {
            tracing::error!(table = %self.table, "Cursor worker panicked");
        }

        if was_open {
            record_cursor_closed(&self.table, self.fetched);
            tracing::debug!(table = %self.table, rows = self.fetched, "Cursor closed");
        }
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("state", &self.state)
            .field("table", &self.table)
            .field("fetched", &self.fetched)
            .finish_non_exhaustive()
    }
}

fn run_worker<P: ConnectionProvider>(
    provider: &P,
    query: &Query,
    ready: oneshot::Sender<Result<(), StreamError>>,
    mut requests: mpsc::Receiver<Fetch>,
) {
    let guard = match ConnectionGuard::open(provider) {
        Ok(guard) => guard,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    serve(guard.connection(), query, ready, &mut requests);
}

fn serve(
    conn: &rusqlite::Connection,
    query: &Query,
    ready: oneshot::Sender<Result<(), StreamError>>,
    requests: &mut mpsc::Receiver<Fetch>,
) {
    tracing::debug!(sql = %query.sql(), "Executing query");
    let mut stmt = match conn.prepare(query.sql()) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    let mut rows = match stmt.query(rusqlite::params_from_iter(query.params.iter())) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // A failed fetch is the last one; the cursor closes on error.
    while let Some(Fetch { limit, reply }) = requests.blocking_recv() {
        let batch = next_rows(&mut rows, query, limit);
        let failed = batch.is_err();
        if reply.send(batch).is_err() || failed {
            break;
        }
    }
}

fn next_rows(
    rows: &mut rusqlite::Rows<'_>,
    query: &Query,
    limit: usize,
) -> Result<Vec<Row>, StreamError> {
    let mut batch = Vec::with_capacity(limit.min(MAX_PREALLOC));
    while batch.len() < limit {
        match rows.next()? {
            Some(row) => batch.push(query.decode(row)?),
            None => break,
        }
    }
    Ok(batch)
}
