//! Consumer-facing access patterns over a table: row streaming, batch
//! streaming, pagination, and the components built on top of them.

pub mod aggregate;
pub mod batches;
pub mod filter;
pub mod paginate;
pub mod rows;
pub mod sink;

pub use aggregate::{Aggregator, RunningMean};
pub use batches::{Batch, BatchStream, Batches};
pub use filter::{BatchFilter, FilterReport};
pub use paginate::{Page, Pages, Paginator};
pub use rows::{RowStream, Rows};
pub use sink::{drain, from_fn, LineSink, OutputFormat, Sink};
