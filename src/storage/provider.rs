//! Connection providers and scoped connection acquisition.
//!
//! A [`ConnectionProvider`] hands out a live connection per `open()` and takes
//! it back on `close()`. Two implementations are provided:
//! - [`SqliteProvider`]: a brand-new connection per call
//! - [`PooledProvider`]: r2d2 pooled connections (SQLite WAL allows concurrent readers)
//!
//! Every acquisition in this crate goes through [`ConnectionGuard`], which
//! closes the connection on every exit path.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::config::ConnectionConfig;
use crate::error::StreamError;

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open an existing database file without write access.
const READ_ONLY_FLAGS: OpenFlags =
    OpenFlags::SQLITE_OPEN_READ_ONLY.union(OpenFlags::SQLITE_OPEN_NO_MUTEX);

/// Source of live connections.
///
/// Implementations own timeouts and retry policy; the streaming core calls
/// `open()` once per cursor or page and `close()` exactly once per opened
/// connection.
pub trait ConnectionProvider: Send + Sync + 'static {
    type Connection: Deref<Target = rusqlite::Connection> + Send;

    fn open(&self) -> Result<Self::Connection, StreamError>;

    fn close(&self, conn: Self::Connection) {
        drop(conn);
    }

    /// Endpoint label for logs.
    fn endpoint(&self) -> &str;
}

/// A connection that was opened directly rather than checked out of a pool.
#[derive(Debug)]
pub struct DirectConnection(Connection);

impl Deref for DirectConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

/// Opens a fresh SQLite connection for every request.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    flags: OpenFlags,
    endpoint: String,
}

impl SqliteProvider {
    /// Create a read-write provider for the database file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            endpoint: path.display().to_string(),
            path,
            flags: OpenFlags::default(),
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            path: config.database_path(),
            flags: OpenFlags::default(),
            endpoint: config.endpoint(),
        }
    }

    /// Open connections read-only. The database file must already exist.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.flags = READ_ONLY_FLAGS;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionProvider for SqliteProvider {
    type Connection = DirectConnection;

    fn open(&self) -> Result<DirectConnection, StreamError> {
        let conn = Connection::open_with_flags(&self.path, self.flags)
            .map_err(|e| StreamError::connection(&self.endpoint, e))?;
        let read_only = self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY);
        apply_pragmas(&conn, read_only).map_err(|e| StreamError::connection(&self.endpoint, e))?;
        Ok(DirectConnection(conn))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pooled connection provider.
///
/// `close()` returns the connection to the pool. The pool's checkout timeout
/// is the provider's connect timeout.
#[derive(Clone)]
pub struct PooledProvider {
    pool: Pool<SqliteConnectionManager>,
    endpoint: String,
}

impl PooledProvider {
    /// Create a new pool for the given database path.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    /// * `timeout` - How long `open()` waits for a free connection
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        max_size: u32,
        timeout: Duration,
    ) -> Result<Self, StreamError> {
        let endpoint = db_path.as_ref().display().to_string();
        Self::build(db_path, max_size, timeout, endpoint, false)
    }

    /// Pool sized and labelled from `config`. With `read_only`, connections
    /// never create the database file and skip the WAL switch.
    pub fn from_config(config: &ConnectionConfig, read_only: bool) -> Result<Self, StreamError> {
        Self::build(
            config.database_path(),
            config.pool_size.max(1),
            config.connect_timeout(),
            config.endpoint(),
            read_only,
        )
    }

    fn build<P: AsRef<Path>>(
        db_path: P,
        max_size: u32,
        timeout: Duration,
        endpoint: String,
        read_only: bool,
    ) -> Result<Self, StreamError> {
        if max_size == 0 {
            return Err(StreamError::invalid("pool size must be positive"));
        }
        let mut manager = SqliteConnectionManager::file(db_path);
        if read_only {
            manager = manager.with_flags(READ_ONLY_FLAGS);
        }

        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_timeout(timeout)
            .connection_customizer(Box::new(PragmaCustomizer { read_only }))
            .build(manager)
            .map_err(|e| StreamError::connection(&endpoint, e))?;

        Ok(Self { pool, endpoint })
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }
}

impl ConnectionProvider for PooledProvider {
    type Connection = PooledConnection<SqliteConnectionManager>;

    fn open(&self) -> Result<Self::Connection, StreamError> {
        self.pool
            .get()
            .map_err(|e| StreamError::connection(&self.endpoint, e))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Connection customizer that applies pragmas on acquire.
#[derive(Debug)]
struct PragmaCustomizer {
    read_only: bool,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        apply_pragmas(conn, self.read_only)
    }
}

/// Apply per-connection pragmas.
///
/// Writable connections switch the database to WAL so readers and the seeder
/// do not block each other.
pub fn apply_pragmas(conn: &Connection, read_only: bool) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if !read_only {
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    }
    Ok(())
}

/// Counts `open`/`close` calls on an inner provider.
#[derive(Debug)]
pub struct TrackedProvider<P> {
    inner: P,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl<P: ConnectionProvider> TrackedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Number of successful `open()` calls.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close()` calls.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections opened but not yet closed.
    pub fn outstanding(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: ConnectionProvider> ConnectionProvider for TrackedProvider<P> {
    type Connection = P::Connection;

    fn open(&self) -> Result<Self::Connection, StreamError> {
        let conn = self.inner.open()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }

    fn close(&self, conn: Self::Connection) {
        self.inner.close(conn);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}

/// Scoped acquisition: the connection is handed back to the provider when
/// the guard drops, including during unwinding.
pub struct ConnectionGuard<'a, P: ConnectionProvider> {
    provider: &'a P,
    conn: Option<P::Connection>,
}

impl<'a, P: ConnectionProvider> ConnectionGuard<'a, P> {
    pub fn open(provider: &'a P) -> Result<Self, StreamError> {
        let conn = provider.open()?;
        Ok(Self {
            provider,
            conn: Some(conn),
        })
    }

    pub fn connection(&self) -> &Connection {
        match &self.conn {
            Some(conn) => &**conn,
            // conn is only taken in Drop
            None => unreachable!("connection used after release"),
        }
    }
}

impl<P: ConnectionProvider> Drop for ConnectionGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.provider.close(conn);
        }
    }
}

/// Open a connection, run `f`, and close the connection whatever `f` returns.
pub fn with_connection<P, T, F>(provider: &P, f: F) -> Result<T, StreamError>
where
    P: ConnectionProvider,
    F: FnOnce(&Connection) -> Result<T, StreamError>,
{
    let guard = ConnectionGuard::open(provider)?;
    f(guard.connection())
}
