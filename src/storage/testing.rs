//! Shared fixtures for unit tests.

use std::sync::Arc;

use rusqlite::Connection;
use rust_decimal::Decimal;
use tempfile::TempDir;

use super::provider::{SqliteProvider, TrackedProvider};
use super::seed::{create_table, insert_users, NewUser};

/// A `user_data` table holding one user per age, behind a counting provider.
///
/// Keep the `TempDir` alive for as long as the provider is used.
pub(crate) fn seeded_provider(ages: &[i64]) -> (TempDir, Arc<TrackedProvider<SqliteProvider>>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let conn = Connection::open(&db_path).unwrap();
    create_table(&conn).unwrap();
    let users: Vec<NewUser> = ages
        .iter()
        .enumerate()
        .map(|(i, age)| NewUser {
            name: format!("user-{i}"),
            email: format!("user{i}@example.com"),
            age: Decimal::from(*age),
        })
        .collect();
    insert_users(&conn, &users).unwrap();
    drop(conn);

    let provider = Arc::new(TrackedProvider::new(SqliteProvider::new(db_path)));
    (temp_dir, provider)
}

/// Make the `age` at key-order `position` undecodable.
pub(crate) fn corrupt_age(provider: &TrackedProvider<SqliteProvider>, position: i64) {
    let conn = Connection::open(provider.inner().path()).unwrap();
    let updated = conn
        .execute(
            "UPDATE user_data SET age = 'old' WHERE user_id = \
             (SELECT user_id FROM user_data ORDER BY user_id LIMIT 1 OFFSET ?1)",
            [position],
        )
        .unwrap();
    assert_eq!(updated, 1);
}
