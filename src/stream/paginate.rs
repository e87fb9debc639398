//! Offset pagination through repeated bounded range queries.
//!
//! Each page is an independent query on its own connection. Rows inserted or
//! deleted between page fetches can shift the offset-to-key correspondence,
//! so a row may be skipped or repeated under concurrent writes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;

use crate::error::StreamError;
use crate::observability::metrics::record_page;
use crate::storage::provider::{with_connection, ConnectionProvider};
use crate::storage::row::Row;
use crate::storage::schema::TableSchema;

/// The rows of one range query. Never empty when yielded from a page sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub offset: i64,
    pub rows: Vec<Row>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for Page {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page @{} ({} rows)", self.offset, self.rows.len())?;
        for row in &self.rows {
            write!(f, "\n  {row}")?;
        }
        Ok(())
    }
}

fn check_page_size(page_size: i64) -> Result<(), StreamError> {
    if page_size <= 0 {
        return Err(StreamError::invalid(format!(
            "page_size must be a positive integer, got {page_size}"
        )));
    }
    Ok(())
}

/// Key-ordered offset pagination over a table.
pub struct Paginator<P> {
    provider: Arc<P>,
    schema: TableSchema,
}

impl<P> Clone for Paginator<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            schema: self.schema.clone(),
        }
    }
}

impl<P: ConnectionProvider> Paginator<P> {
    pub fn new(provider: Arc<P>, schema: &TableSchema) -> Self {
        Self {
            provider,
            schema: schema.clone(),
        }
    }

    /// Fetch up to `page_size` rows starting at `offset`, on a fresh connection
    /// that is released before this returns.
    ///
    /// Arguments are validated before any connection is opened.
    pub fn page(&self, page_size: i64, offset: i64) -> Result<Page, StreamError> {
        check_page_size(page_size)?;
        if offset < 0 {
            return Err(StreamError::invalid(format!(
                "offset must be non-negative, got {offset}"
            )));
        }

        let started = Instant::now();
        let query = self.schema.range_query(page_size, offset);
        let rows = with_connection(&*self.provider, |conn| query.fetch_all(conn))?;
        let elapsed = started.elapsed().as_secs_f64();

        record_page(self.schema.table(), rows.len(), elapsed);
        tracing::debug!(
            table = %self.schema.table(),
            page_size,
            offset,
            rows = rows.len(),
            elapsed_ms = elapsed * 1000.0,
            "Fetched page"
        );
        Ok(Page { offset, rows })
    }

    /// Lazy page sequence from offset 0, ending (without yielding) at the
    /// first empty page.
    pub fn lazy_paginate(&self, page_size: i64) -> Result<Pages<P>, StreamError> {
        check_page_size(page_size)?;
        Ok(Pages {
            paginator: self.clone(),
            page_size,
            next_offset: Some(0),
        })
    }

    /// Async page sequence with up to `depth` page queries in flight.
    ///
    /// Queries run on tokio's blocking pool, each on its own connection.
    /// Pages are emitted in offset order whatever order the queries finish
    /// in. The stream ends at the first empty page, or right after yielding
    /// the first error. Requires a tokio runtime when polled.
    pub fn prefetch_pages(
        &self,
        page_size: i64,
        depth: usize,
    ) -> Result<impl Stream<Item = Result<Page, StreamError>> + Send + 'static, StreamError> {
        check_page_size(page_size)?;
        if depth == 0 {
            return Err(StreamError::invalid("prefetch depth must be a positive integer"));
        }

        let paginator = self.clone();
        let offsets = stream::iter((0i64..).map(move |i| i.saturating_mul(page_size)));
        let pages = offsets
            .map(move |offset| {
                let paginator = paginator.clone();
                async move {
                    tokio::task::spawn_blocking(move || paginator.page(page_size, offset))
                        .await
                        .map_err(|e| {
                            tracing::error!(offset, error = %e, "Page fetch task failed");
                            StreamError::WorkerPanic
                        })?
                }
            })
            .buffered(depth)
            .scan(false, |failed, result| {
                let next = match result {
                    _ if *failed => None,
                    Ok(page) if page.is_empty() => None,
                    Ok(page) => Some(Ok(page)),
                    Err(e) => {
                        *failed = true;
                        Some(Err(e))
                    }
                };
                future::ready(next)
            });
        Ok(pages)
    }
}

/// Iterator over pages of one [`Paginator::lazy_paginate`] call.
///
/// Holds no connection between pages.
pub struct Pages<P> {
    paginator: Paginator<P>,
    page_size: i64,
    next_offset: Option<i64>,
}

impl<P> Pages<P> {
    /// Offset of the next page to fetch, or `None` once the sequence ended.
    pub fn next_offset(&self) -> Option<i64> {
        self.next_offset
    }
}

impl<P: ConnectionProvider> Iterator for Pages<P> {
    type Item = Result<Page, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next_offset.take()?;
        match self.paginator.page(self.page_size, offset) {
            Ok(page) if page.is_empty() => None,
            Ok(page) => {
                self.next_offset = offset.checked_add(self.page_size);
                Some(Ok(page))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
