//! Tablestream: bounded-memory streaming over large SQLite tables.
//!
//! Three access patterns share one table and one schema descriptor:
//!
//! - **Row streaming**: one long-lived cursor, one row per pull
//! - **Batch streaming**: one long-lived cursor, `fetch_many(n)` per pull
//! - **Pagination**: a fresh connection and `LIMIT/OFFSET` query per page
//!
//! Cursors own their connection exclusively and release it on exhaustion,
//! on early drop, and on error.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy shared by every component
//! - [`observability`]: Metrics and tracing setup
//! - [`storage`]: Connection providers, schema descriptor, rows, cursors, seeding
//! - [`stream`]: Row/batch streams, paginator, aggregator, batch filter, sinks

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // stream::rows::RowStream is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::similar_names,              // row/rows/rowid are fine
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod error;
pub mod observability;
pub mod storage;
pub mod stream;

pub use error::StreamError;
pub use storage::provider::{ConnectionProvider, PooledProvider, SqliteProvider, TrackedProvider};
pub use storage::row::{Row, Value};
pub use storage::schema::{ColumnType, TableSchema};
pub use stream::{Aggregator, BatchFilter, BatchStream, Paginator, RowStream};

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) row key.
///
/// UUIDv7 keys sort by creation time, so `ORDER BY user_id` roughly follows
/// insertion order.
///
/// # Example
///
/// ```
/// let id = tablestream::generate_user_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_user_id() -> String {
    Uuid::now_v7().to_string()
}
