//! Error taxonomy for cursors, streams and pagination.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Boxed source error for connection factory failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Error type shared by every streaming component.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Rejected before any I/O; never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("cursor is closed")]
    ClosedCursor,

    #[error("table `{table}` has no column `{column}`")]
    MissingRequiredColumn { table: String, column: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cannot decode column `{column}`: {detail}")]
    Decode { column: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to spawn cursor worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("cursor worker terminated unexpectedly")]
    WorkerPanic,
}

impl StreamError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn connection(
        endpoint: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        Self::MissingRequiredColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn decode(column: &str, detail: impl Into<String>) -> Self {
        Self::Decode {
            column: column.to_string(),
            detail: detail.into(),
        }
    }

    /// True when a sink's output pipe was closed by the reader.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_detection() {
        let err = StreamError::from(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(err.is_broken_pipe());
        assert!(!StreamError::ClosedCursor.is_broken_pipe());
    }

    #[test]
    fn test_missing_column_message() {
        let err = StreamError::missing_column("user_data", "age");
        assert_eq!(err.to_string(), "table `user_data` has no column `age`");
    }
}
