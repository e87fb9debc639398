//! Fixed-size batch streaming over one cursor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::StreamError;
use crate::storage::cursor::RowCursor;
use crate::storage::provider::ConnectionProvider;
use crate::storage::row::Row;
use crate::storage::schema::{Query, TableSchema};

/// A run of rows pulled from one continuously open cursor.
///
/// Every batch holds exactly the configured size except possibly the last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    /// Zero-based position of this batch in its stream.
    pub index: usize,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {} ({} rows)", self.index, self.rows.len())?;
        for row in &self.rows {
            write!(f, "\n  {row}")?;
        }
        Ok(())
    }
}

/// Produces key-ordered batch sequences from a table.
pub struct BatchStream<P> {
    provider: Arc<P>,
    query: Arc<Query>,
}

impl<P> Clone for BatchStream<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            query: Arc::clone(&self.query),
        }
    }
}

impl<P: ConnectionProvider> BatchStream<P> {
    pub fn new(provider: Arc<P>, schema: &TableSchema) -> Result<Self, StreamError> {
        let query = schema.ordered_scan(schema.key())?;
        Ok(Self {
            provider,
            query: Arc::new(query),
        })
    }

    /// A lazy sequence of batches of `batch_size` rows.
    ///
    /// Fails with `InvalidArgument` for a zero batch size, before any
    /// connection is opened.
    pub fn stream_batches(&self, batch_size: usize) -> Result<Batches<P>, StreamError> {
        if batch_size == 0 {
            return Err(StreamError::invalid("batch_size must be a positive integer"));
        }
        Ok(Batches {
            provider: Arc::clone(&self.provider),
            query: Arc::clone(&self.query),
            batch_size,
            cursor: None,
            next_index: 0,
            done: false,
        })
    }
}

/// Iterator over one cursor's batches.
///
/// Holds at most one batch in memory. The cursor is released after the final
/// (short or empty) fetch, on error, and on early drop.
pub struct Batches<P> {
    provider: Arc<P>,
    query: Arc<Query>,
    batch_size: usize,
    cursor: Option<RowCursor>,
    next_index: usize,
    done: bool,
}

impl<P: ConnectionProvider> Batches<P> {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Stop iterating and release the cursor. Idempotent.
    pub fn close(&mut self) {
        self.done = true;
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    fn fail(&mut self, e: StreamError) -> Option<Result<Batch, StreamError>> {
        self.close();
        Some(Err(e))
    }
}

impl<P: ConnectionProvider> Iterator for Batches<P> {
    type Item = Result<Batch, StreamError>;

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

        let fetched = self.cursor.as_mut()?.fetch_many(self.batch_size);
        let rows = match fetched {
            Ok(rows) => rows,
            Err(e) => return self.fail(e),
        };

        if rows.len() < self.batch_size {
            self.close();
        }
        if rows.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            rows,
        };
        self.next_index += 1;
        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{corrupt_age, seeded_provider};

    fn sizes<P: ConnectionProvider>(batches: Batches<P>) -> Vec<usize> {
        batches.map(|b| b.unwrap().len()).collect()
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let (_dir, provider) = seeded_provider(&[1, 2, 3, 4, 5, 6, 7]);
        let stream = BatchStream::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        assert_eq!(sizes(stream.stream_batches(3).unwrap()), vec![3, 3, 1]);
        assert_eq!(provider.outstanding(), 0);
    }

    #[test]
    fn test_exact_multiple_ends_on_empty_fetch() {
        let (_dir, provider) = seeded_provider(&[1, 2, 3, 4]);
        let stream = BatchStream::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        let mut batches = stream.stream_batches(2).unwrap();
        assert_eq!(batches.next().unwrap().unwrap().index, 0);
        assert_eq!(batches.next().unwrap().unwrap().index, 1);
        assert!(batches.is_open());
        assert!(batches.next().is_none());
        assert!(!batches.is_open());
        assert_eq!(provider.closed(), 1);
    }

    #[test]
    fn test_empty_table_yields_nothing() {
        let (_dir, provider) = seeded_provider(&[]);
        let stream = BatchStream::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        assert!(sizes(stream.stream_batches(10).unwrap()).is_empty());
        assert_eq!(provider.outstanding(), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected_without_io() {
        let (_dir, provider) = seeded_provider(&[1]);
        let stream = BatchStream::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        assert!(matches!(
            stream.stream_batches(0),
            Err(StreamError::InvalidArgument(_))
        ));
        assert_eq!(provider.opened(), 0);
    }

    #[test]
    fn test_batch_display() {
        let batch = Batch {
            index: 2,
            rows: Vec::new(),
        };
        assert_eq!(batch.to_string(), "batch 2 (0 rows)");
    }

    #[test]
    fn test_failed_batch_is_not_split() {
        let (_dir, provider) = seeded_provider(&[20, 30, 40, 50, 60]);
        corrupt_age(&provider, 3);
        let stream = BatchStream::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        let results: Vec<Result<Batch, StreamError>> = stream.stream_batches(2).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 2);
        assert!(matches!(&results[1], Err(StreamError::Decode { column, .. }) if column == "age"));
        assert_eq!(provider.closed(), 1);
        assert_eq!(provider.outstanding(), 0);
    }
}
