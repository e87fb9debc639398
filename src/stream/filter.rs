//! Two-level (batch, row) filtering over a batch stream.

use std::sync::Arc;

use crate::error::StreamError;
use crate::storage::provider::ConnectionProvider;
use crate::storage::row::{Row, Value};
use crate::storage::schema::TableSchema;

use super::batches::Batches;
use super::sink::Sink;

type Predicate = Box<dyn Fn(&Row) -> bool + Send + Sync>;

/// Counts from one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub batches: usize,
    pub rows_seen: usize,
    pub rows_passed: usize,
}

/// Normalizes one numeric column and forwards rows passing a predicate.
///
/// Normalization coerces an exact-decimal value in the column to an integer
/// before the predicate sees the row.
pub struct BatchFilter {
    column: Arc<str>,
    predicate: Predicate,
}

impl BatchFilter {
    /// Fails with `MissingRequiredColumn` if `column` is not in the schema.
    pub fn new<F>(schema: &TableSchema, column: &str, predicate: F) -> Result<Self, StreamError>
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        let column = Arc::clone(&schema.require(column)?.name);
        Ok(Self {
            column,
            predicate: Box::new(predicate),
        })
    }

    /// Rows whose `age` is strictly greater than `threshold`. Null ages never pass.
    pub fn older_than(schema: &TableSchema, threshold: i64) -> Result<Self, StreamError> {
        Self::new(schema, "age", move |row| {
            row.get("age")
                .and_then(Value::as_i64)
                .is_some_and(|age| age > threshold)
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Normalize a row and test it. Returns the normalized row if it passes.
    pub fn apply(&self, row: Row) -> Option<Row> {
        let row = row.map_value(&self.column, Value::into_integer);
        (self.predicate)(&row).then_some(row)
    }

    /// Drive `batches` to completion, handing passing rows to `sink`.
    ///
    /// Only the batch being filtered is held in memory. An error from the
    /// stream or the sink stops the run; dropping `batches` releases its cursor.
    pub fn run<P, S>(&self, batches: Batches<P>, sink: &mut S) -> Result<FilterReport, StreamError>
    where
        P: ConnectionProvider,
        S: Sink<Row> + ?Sized,
    {
        let mut report = FilterReport::default();
        match self.feed(batches, sink, &mut report) {
            Ok(()) => {
                sink.finish()?;
                tracing::debug!(
                    batches = report.batches,
                    rows_seen = report.rows_seen,
                    rows_passed = report.rows_passed,
                    "Batch filter finished"
                );
                Ok(report)
            }
            Err(e) => {
                sink.abort(&e);
                Err(e)
            }
        }
    }

    fn feed<P, S>(
        &self,
        batches: Batches<P>,
        sink: &mut S,
        report: &mut FilterReport,
    ) -> Result<(), StreamError>
    where
        P: ConnectionProvider,
        S: Sink<Row> + ?Sized,
    {
        for batch in batches {
            let batch = batch?;
            report.batches += 1;
            for row in batch {
                report.rows_seen += 1;
                if let Some(row) = self.apply(row) {
                    sink.accept(row)?;
                    report.rows_passed += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::seeded_provider;
    use crate::stream::batches::BatchStream;
    use crate::stream::sink::from_fn;

    #[test]
    fn test_older_than_filters_and_normalizes() {
        let (_dir, provider) = seeded_provider(&[20, 26, 25, 40, 31]);
        let schema = TableSchema::user_data();
        let stream = BatchStream::new(Arc::clone(&provider), &schema).unwrap();
        let filter = BatchFilter::older_than(&schema, 25).unwrap();

        let mut passed: Vec<Row> = Vec::new();
        let report = filter.run(stream.stream_batches(2).unwrap(), &mut passed).unwrap();

        assert_eq!(
            report,
            FilterReport {
                batches: 3,
                rows_seen: 5,
                rows_passed: 3
            }
        );
        let mut ages: Vec<i64> = passed
            .iter()
            .map(|row| match row.get("age") {
                Some(Value::Integer(age)) => *age,
                other => panic!("age not normalized: {other:?}"),
            })
            .collect();
        ages.sort_unstable();
        assert_eq!(ages, vec![26, 31, 40]);
        assert_eq!(provider.outstanding(), 0);
    }

    #[test]
    fn test_sink_error_releases_cursor() {
        let (_dir, provider) = seeded_provider(&[30, 40, 50, 60]);
        let schema = TableSchema::user_data();
        let stream = BatchStream::new(Arc::clone(&provider), &schema).unwrap();
        let filter = BatchFilter::older_than(&schema, 0).unwrap();

        let mut sink = from_fn(|_row: Row| Err(StreamError::invalid("sink full")));
        let result = filter.run(stream.stream_batches(2).unwrap(), &mut sink);

        assert!(matches!(result, Err(StreamError::InvalidArgument(_))));
        assert_eq!(provider.opened(), 1);
        assert_eq!(provider.closed(), 1);
    }

    #[test]
    fn test_requires_filtered_column() {
        let schema =
            TableSchema::new("t", &[("id", crate::storage::schema::ColumnType::Integer)], "id")
                .unwrap();
        assert!(matches!(
            BatchFilter::older_than(&schema, 25),
            Err(StreamError::MissingRequiredColumn { .. })
        ));
    }
}
