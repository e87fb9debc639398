//! Lazy row-by-row streaming over one cursor.

use std::sync::Arc;

use crate::error::StreamError;
use crate::storage::cursor::RowCursor;
use crate::storage::provider::ConnectionProvider;
use crate::storage::row::Row;
use crate::storage::schema::{Query, TableSchema};

/// Produces key-ordered row sequences from a table.
///
/// Each call to [`RowStream::stream`] opens its own cursor from the start of
/// the table; calls share no state.
pub struct RowStream<P> {
    provider: Arc<P>,
    query: Arc<Query>,
}

impl<P> Clone for RowStream<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            query: Arc::clone(&self.query),
        }
    }
}

impl<P: ConnectionProvider> RowStream<P> {
    /// Stream every column, ordered by the schema key.
    pub fn new(provider: Arc<P>, schema: &TableSchema) -> Result<Self, StreamError> {
        let query = schema.ordered_scan(schema.key())?;
        Ok(Self {
            provider,
            query: Arc::new(query),
        })
    }

    /// Stream only `columns`, still ordered by the schema key.
    ///
    /// Fails with `MissingRequiredColumn` before any I/O if a column is unknown.
    pub fn projected(
        provider: Arc<P>,
        schema: &TableSchema,
        columns: &[&str],
    ) -> Result<Self, StreamError> {
        let query = schema.projected_scan(columns)?;
        Ok(Self {
            provider,
            query: Arc::new(query),
        })
    }

    /// A lazy, single-pass row sequence. No connection is opened until the
    /// first pull.
    pub fn stream(&self) -> Rows<P> {
        Rows {
            provider: Arc::clone(&self.provider),
            query: Arc::clone(&self.query),
            cursor: None,
            done: false,
        }
    }
}

/// Iterator over one cursor's rows.
///
/// The cursor is closed when the rows run out, when an error is yielded, and
/// when the iterator is dropped early.
pub struct Rows<P> {
    provider: Arc<P>,
    query: Arc<Query>,
    cursor: Option<RowCursor>,
    done: bool,
}

impl<P: ConnectionProvider> Rows<P> {
    /// Stop iterating and release the cursor. Idempotent.
    pub fn close(&mut self) {
        self.done = true;
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    /// Whether a cursor is currently held.
    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    fn fail(&mut self, e: StreamError) -> Option<Result<Row, StreamError>> {
        self.close();
        Some(Err(e))
    }
}

impl<P: ConnectionProvider> Iterator for Rows<P> {
    type Item = Result<Row, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.cursor.is_none() {
            match RowCursor::open_query(&self.provider, Arc::clone(&self.query)) {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(e) => return self.fail(e),
            }
        }

        let fetched = self.cursor.as_mut()?.fetch_one();
        match fetched {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.close();
                None
            }
            Err(e) => self.fail(e),
        }
    }
}
