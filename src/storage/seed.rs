//! Provisioning and seeding of the `user_data` table.
//!
//! CSV input is `name,email,age` with a header row (matched
//! case-insensitively, any column order). Quoted fields may contain commas
//! and doubled quotes but not line breaks. Ages must be whole numbers;
//! lines with any other age are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::generate_user_id;

/// Error type for seeding operations.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV is missing required header `{0}`")]
    MissingHeader(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A user record to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: Decimal,
}

/// Outcome of a CSV load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Rows inserted or updated.
    pub inserted: usize,
    /// Blank or malformed lines.
    pub skipped: usize,
}

const CREATE_USER_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS user_data (
    user_id TEXT NOT NULL PRIMARY KEY,
    name    TEXT NOT NULL,
    email   TEXT NOT NULL UNIQUE,
    age     TEXT NOT NULL  -- exact decimal
)
"#;

const UPSERT_USER: &str = r#"
INSERT INTO user_data (user_id, name, email, age)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(email) DO UPDATE SET
    name = excluded.name,
    age = excluded.age
"#;

/// Create `user_data` if it does not exist.
pub fn create_table(conn: &Connection) -> Result<(), SeedError> {
    conn.execute_batch(CREATE_USER_DATA)?;
    tracing::info!("Table user_data ensured");
    Ok(())
}

/// Upsert users by email in one transaction. Returns the number written.
pub fn insert_users(conn: &Connection, users: &[NewUser]) -> Result<usize, SeedError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(UPSERT_USER)?;
        for user in users {
            stmt.execute(params![
                generate_user_id(),
                user.name,
                user.email,
                user.age.to_string()
            ])?;
        }
    }
    tx.commit()?;
    Ok(users.len())
}

/// Load users from a CSV file, upserting by email.
#[tracing::instrument(skip(conn, path), fields(path = %path.display()))]
pub fn insert_csv(conn: &Connection, path: &Path) -> Result<SeedReport, SeedError> {
    let io_err = |source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => CsvHeader::parse(&line.map_err(io_err)?)?,
        None => return Err(SeedError::MissingHeader("name")),
    };

    let mut report = SeedReport::default();
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(UPSERT_USER)?;
        for line in lines {
            let line = line.map_err(io_err)?;
            let Some(user) = header.record(&line) else {
                report.skipped += 1;
                continue;
            };
            stmt.execute(params![
                generate_user_id(),
                user.name,
                user.email,
                user.age.to_string()
            ])?;
            report.inserted += 1;
        }
    }
    tx.commit()?;

    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "CSV loaded"
    );
    Ok(report)
}

/// Column positions of the required fields.
#[derive(Debug, Clone, Copy)]
struct CsvHeader {
    name: usize,
    email: usize,
    age: usize,
}

impl CsvHeader {
    fn parse(line: &str) -> Result<Self, SeedError> {
        let fields = split_record(line.trim_start_matches('\u{feff}'));
        let find = |wanted: &'static str| {
            fields
                .iter()
                .position(|f| f.trim().eq_ignore_ascii_case(wanted))
                .ok_or(SeedError::MissingHeader(wanted))
        };
        Ok(Self {
            name: find("name")?,
            email: find("email")?,
            age: find("age")?,
        })
    }

    /// A well-formed record, or `None` for blank and malformed lines.
    fn record(&self, line: &str) -> Option<NewUser> {
        if line.trim().is_empty() {
            return None;
        }
        let fields = split_record(line);
        let field = |idx: usize| fields.get(idx).map(|f| f.trim()).filter(|f| !f.is_empty());

        let name = field(self.name)?;
        let email = field(self.email)?;
        let age: i64 = field(self.age)?.parse().ok()?;
        Some(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            age: Decimal::from(age),
        })
    }
}

/// Split one CSV line into fields, honouring double-quoted fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
