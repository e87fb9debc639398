//! Test utilities for Tablestream integration tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - Seeded `user_data` tables behind a counting provider

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use rust_decimal::Decimal;
use tempfile::TempDir;

use tablestream::observability::tracing::init_test_tracing;
use tablestream::storage::seed::{create_table, insert_users, NewUser};
use tablestream::{SqliteProvider, TrackedProvider};

pub type Provider = Arc<TrackedProvider<SqliteProvider>>;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    /// Path to the database file
    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("test.db")
    }

    /// A counting provider over a `user_data` table with `count` users.
    ///
    /// User `i` is named `user-i` and is `20 + i % 50` years old. Seeding goes
    /// through its own connection so the returned counters start at zero.
    pub fn seeded(&self, count: usize) -> Provider {
        let users: Vec<NewUser> = (0..count)
            .map(|i| NewUser {
                name: format!("user-{i}"),
                email: format!("user{i}@example.com"),
                age: Decimal::from(20 + (i % 50) as i64),
            })
            .collect();

        let conn = Connection::open(self.db_path()).expect("failed to open test database");
        create_table(&conn).expect("failed to create user_data");
        insert_users(&conn, &users).expect("failed to insert users");
        drop(conn);

        Arc::new(TrackedProvider::new(SqliteProvider::new(self.db_path())))
    }

    /// Overwrite the `age` of the row at key-order `position` with text that
    /// does not decode as a number.
    pub fn corrupt_age(&self, position: i64) {
        let conn = Connection::open(self.db_path()).expect("failed to open test database");
        let updated = conn
            .execute(
                "UPDATE user_data SET age = 'old' WHERE user_id = \
                 (SELECT user_id FROM user_data ORDER BY user_id LIMIT 1 OFFSET ?1)",
                [position],
            )
            .expect("failed to corrupt row");
        assert_eq!(updated, 1, "no row at position {position}");
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Expected mean of the ages produced by [`TestFixture::seeded`].
pub fn expected_average(count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let sum: usize = (0..count).map(|i| 20 + i % 50).sum();
    sum as f64 / count as f64
}
