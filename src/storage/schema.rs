//! Table schema descriptor and the statements rendered from it.
//!
//! A [`TableSchema`] is supplied once at construction and never changes.
//! Every row produced from it carries the same column set, in order.

use std::sync::Arc;

use rusqlite::types::ValueRef;
use rust_decimal::Decimal;

use super::row::{Row, Value};
use crate::error::StreamError;

/// Declared type of a column, used to decode SQLite storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    /// Exact decimal; stored as TEXT, INTEGER or REAL.
    Decimal,
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Arc<str>,
    pub ty: ColumnType,
}

/// Immutable description of the streamed table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: Arc<[Column]>,
    key: Arc<str>,
}

impl TableSchema {
    /// Build a descriptor from ordered `(name, type)` pairs and the order key.
    ///
    /// Fails with `InvalidArgument` on an empty column list or a malformed
    /// identifier, and with `MissingRequiredColumn` when `key` is not a column.
    pub fn new(table: &str, columns: &[(&str, ColumnType)], key: &str) -> Result<Self, StreamError> {
        validate_identifier(table)?;
        if columns.is_empty() {
            return Err(StreamError::invalid(format!(
                "table `{table}` must declare at least one column"
            )));
        }

        let mut built: Vec<Column> = Vec::with_capacity(columns.len());
        for (name, ty) in columns {
            validate_identifier(name)?;
            if built.iter().any(|c| &*c.name == *name) {
                return Err(StreamError::invalid(format!("duplicate column `{name}`")));
            }
            built.push(Column {
                name: Arc::from(*name),
                ty: *ty,
            });
        }

        let key = built
            .iter()
            .find(|c| &*c.name == key)
            .map(|c| Arc::clone(&c.name))
            .ok_or_else(|| StreamError::missing_column(table, key))?;

        Ok(Self {
            table: table.to_string(),
            columns: built.into(),
            key,
        })
    }

    /// The `user_data` table provisioned by [`crate::storage::seed`].
    pub fn user_data() -> Self {
        Self {
            table: "user_data".to_string(),
            columns: Arc::from(vec![
                column("user_id", ColumnType::Text),
                column("name", ColumnType::Text),
                column("email", ColumnType::Text),
                column("age", ColumnType::Decimal),
            ]),
            key: Arc::from("user_id"),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column a component depends on.
    pub fn require(&self, name: &str) -> Result<&Column, StreamError> {
        self.columns
            .iter()
            .find(|c| &*c.name == name)
            .ok_or_else(|| StreamError::missing_column(&self.table, name))
    }

    /// `SELECT <all columns> FROM <table> ORDER BY <order_column>`.
    pub fn ordered_scan(&self, order_column: &str) -> Result<Query, StreamError> {
        self.require(order_column)?;
        Ok(Query {
            table: self.table.clone(),
            sql: format!(
                "SELECT {} FROM {} ORDER BY {order_column}",
                column_list(&self.columns),
                self.table
            ),
            columns: Arc::clone(&self.columns),
            params: Vec::new(),
        })
    }

    /// `SELECT <columns> FROM <table> ORDER BY <key>`.
    pub fn projected_scan(&self, names: &[&str]) -> Result<Query, StreamError> {
        if names.is_empty() {
            return Err(StreamError::invalid("projection must name at least one column"));
        }
        let columns = names
            .iter()
            .map(|name| self.require(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Query {
            table: self.table.clone(),
            sql: format!(
                "SELECT {} FROM {} ORDER BY {}",
                column_list(&columns),
                self.table,
                self.key
            ),
            columns: columns.into(),
            params: Vec::new(),
        })
    }

    /// Key-ordered `LIMIT ?1 OFFSET ?2` range query over all columns.
    pub fn range_query(&self, limit: i64, offset: i64) -> Query {
        Query {
            table: self.table.clone(),
            sql: format!(
                "SELECT {} FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
                column_list(&self.columns),
                self.table,
                self.key
            ),
            columns: Arc::clone(&self.columns),
            params: vec![limit, offset],
        }
    }
}

/// A rendered statement plus the columns it yields.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) table: String,
    pub(crate) sql: String,
    pub(crate) columns: Arc<[Column]>,
    pub(crate) params: Vec<i64>,
}

impl Query {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Decode one result row positionally against the declared columns.
    pub(crate) fn decode(&self, row: &rusqlite::Row<'_>) -> Result<Row, StreamError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            let value = decode_value(column, row.get_ref(idx)?)?;
            fields.push((Arc::clone(&column.name), value));
        }
        Ok(Row::new(fields))
    }

    /// Run the statement to completion on `conn`, collecting every row.
    pub(crate) fn fetch_all(&self, conn: &rusqlite::Connection) -> Result<Vec<Row>, StreamError> {
        tracing::debug!(sql = %self.sql, params = ?self.params, "Executing query");
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(self.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(self.decode(row)?);
        }
        Ok(out)
    }
}

fn decode_value(column: &Column, raw: ValueRef<'_>) -> Result<Value, StreamError> {
    let name = &column.name;
    let value = match (column.ty, raw) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnType::Integer, ValueRef::Integer(i)) => Value::Integer(i),
        (ColumnType::Text, ValueRef::Text(bytes)) => Value::Text(utf8(name, bytes)?.to_string()),
        (ColumnType::Text, ValueRef::Integer(i)) => Value::Text(i.to_string()),
        (ColumnType::Decimal, ValueRef::Integer(i)) => Value::Decimal(Decimal::from(i)),
        (ColumnType::Decimal, ValueRef::Real(f)) => Value::Decimal(
            Decimal::try_from(f).map_err(|e| StreamError::decode(name, e.to_string()))?,
        ),
        (ColumnType::Decimal, ValueRef::Text(bytes)) => {
            let text = utf8(name, bytes)?;
            Value::Decimal(
                text.trim()
                    .parse::<Decimal>()
                    .map_err(|e| StreamError::decode(name, format!("`{text}`: {e}")))?,
            )
        }
        (ty, other) => {
            return Err(StreamError::decode(
                name,
                format!("{:?} storage for {ty:?} column", other.data_type()),
            ))
        }
    };
    Ok(value)
}

fn utf8<'a>(column: &str, bytes: &'a [u8]) -> Result<&'a str, StreamError> {
    std::str::from_utf8(bytes).map_err(|e| StreamError::decode(column, e.to_string()))
}

fn column(name: &str, ty: ColumnType) -> Column {
    Column {
        name: Arc::from(name),
        ty,
    }
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| &*c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed.
fn validate_identifier(name: &str) -> Result<(), StreamError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StreamError::invalid(format!("invalid identifier `{name}`")))
    }
}
