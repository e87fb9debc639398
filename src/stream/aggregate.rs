//! Constant-memory statistics over a row stream.

use std::sync::Arc;

use crate::error::StreamError;
use crate::storage::provider::ConnectionProvider;
use crate::storage::schema::TableSchema;

use super::rows::RowStream;

/// Running sum and count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: i128,
    count: u64,
}

impl RunningMean {
    pub fn push(&mut self, value: i64) {
        self.sum += i128::from(value);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `sum / count`, or 0.0 when nothing was pushed.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum as f64 / self.count as f64
    }
}

/// Streaming aggregates over one column of a table.
pub struct Aggregator<P> {
    provider: Arc<P>,
    schema: TableSchema,
}

impl<P: ConnectionProvider> Aggregator<P> {
    /// Fails with `MissingRequiredColumn` if the schema has no `age` column.
    pub fn new(provider: Arc<P>, schema: &TableSchema) -> Result<Self, StreamError> {
        schema.require("age")?;
        Ok(Self {
            provider,
            schema: schema.clone(),
        })
    }

    /// Mean of the `age` column; 0.0 for an empty table.
    pub fn average_age(&self) -> Result<f64, StreamError> {
        self.average("age")
    }

    /// Mean of a numeric column, streamed one value at a time.
    ///
    /// Decimals are truncated to integers and nulls are skipped. A text value
    /// fails with `Decode`.
    #[tracing::instrument(skip(self), fields(table = %self.schema.table()))]
    pub fn average(&self, column: &str) -> Result<f64, StreamError> {
        let stream = RowStream::projected(Arc::clone(&self.provider), &self.schema, &[column])?;

        let mut mean = RunningMean::default();
        for row in stream.stream() {
            let row = row?;
            let Some(value) = row.get(column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let n = value
                .as_i64()
                .ok_or_else(|| StreamError::decode(column, format!("`{value}` is not numeric")))?;
            mean.push(n);
        }

        tracing::debug!(rows = mean.count(), mean = mean.mean(), "Average computed");
        Ok(mean.mean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::seeded_provider;

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::default();
        assert_eq!(mean.mean(), 0.0);
        for v in [20, 30, 40] {
            mean.push(v);
        }
        assert_eq!(mean.count(), 3);
        assert!((mean.mean() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_age() {
        let (_dir, provider) = seeded_provider(&[20, 30, 40]);
        let aggregator = Aggregator::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        let avg = aggregator.average_age().unwrap();
        assert!((avg - 30.0).abs() < f64::EPSILON);
        assert_eq!(provider.outstanding(), 0);
    }

    #[test]
    fn test_average_age_empty_table_is_zero() {
        let (_dir, provider) = seeded_provider(&[]);
        let aggregator = Aggregator::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        assert_eq!(aggregator.average_age().unwrap(), 0.0);
    }

    #[test]
    fn test_text_column_is_not_numeric() {
        let (_dir, provider) = seeded_provider(&[20]);
        let aggregator = Aggregator::new(Arc::clone(&provider), &TableSchema::user_data()).unwrap();

        assert!(matches!(
            aggregator.average("name"),
            Err(StreamError::Decode { .. })
        ));
        assert_eq!(provider.outstanding(), 0);
    }
}
