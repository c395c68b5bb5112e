//! Shared configuration structures.

use serde::{Deserialize, Serialize};

use domain::{
    DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_DATABASE_NAME, DEFAULT_DATABASE_PORT,
    DEFAULT_DATABASE_USER, DEFAULT_POOL_SIZE,
};

/// Database configuration.
///
/// Supplied by whoever loads configuration; the persistence layer never
/// reads the environment itself.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    /// 0 leaves the port to the driver default
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Connect timeout in seconds, 0 = driver default
    pub connect_timeout_secs: u64,
    /// Number of pooled connections
    pub pool_size: u32,
}

impl DatabaseConfig {
    /// Configuration for a database running on the local host.
    pub fn for_localhost(
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_DATABASE_PORT,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::for_localhost(DEFAULT_DATABASE_NAME, DEFAULT_DATABASE_USER, "")
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}
