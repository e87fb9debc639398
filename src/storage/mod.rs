//! SQLite storage layer for Tablestream.
//!
//! Provides:
//! - Connection providers (direct and pooled) with scoped acquisition
//! - Table schema descriptor and statement rendering
//! - Row and value types
//! - Pull-based cursors that own their connection
//! - Table provisioning and CSV seeding

pub mod cursor;
pub mod provider;
pub mod row;
pub mod schema;
pub mod seed;

#[cfg(test)]
pub(crate) mod testing;
