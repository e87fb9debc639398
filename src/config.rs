//! Configuration parsing for Tablestream.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Connection target for every opened connection.
///
/// The embedded engine resolves `database` to `<data_dir>/<database>.db`;
/// host, port and user identify the endpoint in logs and errors.
#[derive(Args, Debug, Clone)]
pub struct ConnectionConfig {
    /// Database host
    #[arg(long, env = "TABLESTREAM_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Database port
    #[arg(long, env = "TABLESTREAM_PORT", default_value_t = 3306)]
    pub port: u16,

    /// Database user
    #[arg(long, env = "TABLESTREAM_USER", default_value = "root")]
    pub user: String,

    /// Database password
    #[arg(long, env = "TABLESTREAM_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Database name
    #[arg(long, env = "TABLESTREAM_DB", default_value = "ALX_prodev")]
    pub database: String,

    /// Data directory for SQLite database files
    #[arg(short, long, env = "TABLESTREAM_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Size of the connection pool (0 opens a fresh connection per request)
    #[arg(long, env = "TABLESTREAM_POOL_SIZE", default_value_t = 0)]
    pub pool_size: u32,

    /// Seconds to wait for a connection before failing
    #[arg(long, env = "TABLESTREAM_CONNECT_TIMEOUT", default_value_t = 30)]
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Path of the database file backing `database`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.database))
    }

    /// Endpoint label for logs and errors. Never includes the password.
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Create a configuration rooted at a throwaway data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3306,
            user: "root".into(),
            password: String::new(),
            database: "ALX_prodev".into(),
            data_dir: PathBuf::from("./data"),
            pool_size: 0,
            connect_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 3306);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.database_path(), PathBuf::from("./data/ALX_prodev.db"));
    }

    #[test]
    fn test_endpoint_omits_password() {
        let config = ConnectionConfig {
            password: "hunter2".into(),
            ..ConnectionConfig::default()
        };
        let endpoint = config.endpoint();
        assert_eq!(endpoint, "root@127.0.0.1:3306/ALX_prodev");
        assert!(!endpoint.contains("hunter2"));
    }
}
