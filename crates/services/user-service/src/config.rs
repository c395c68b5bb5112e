//! User service configuration.

use std::env;
use std::str::FromStr;

use chrono::Duration;

use common::DatabaseConfig;
use domain::{
    DEFAULT_API_KEY_VALIDITY_SECONDS, DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_DATABASE_NAME,
    DEFAULT_DATABASE_PORT, DEFAULT_DATABASE_USER, DEFAULT_POOL_SIZE,
};

/// User service configuration.
#[derive(Debug, Clone)]
pub struct UserServiceConfig {
    /// Where the users and api keys are stored
    pub database: DatabaseConfig,
    /// Lifetime of the api keys handed out on login, in seconds
    pub api_key_validity_seconds: i64,
}

impl UserServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from `lookup`, falling back to the defaults for
    /// missing or malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database: DatabaseConfig {
                host: lookup("DATABASE_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_var(&lookup, "DATABASE_PORT").unwrap_or(DEFAULT_DATABASE_PORT),
                database: lookup("DATABASE_NAME")
                    .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
                user: lookup("DATABASE_USER").unwrap_or_else(|| DEFAULT_DATABASE_USER.to_string()),
                password: lookup("DATABASE_PASSWORD").unwrap_or_default(),
                connect_timeout_secs: parse_var(&lookup, "DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
                pool_size: parse_var(&lookup, "DATABASE_POOL_SIZE").unwrap_or(DEFAULT_POOL_SIZE),
            },
            api_key_validity_seconds: parse_var(&lookup, "API_KEY_VALIDITY_SECONDS")
                .unwrap_or(DEFAULT_API_KEY_VALIDITY_SECONDS),
        }
    }

    pub fn api_key_validity(&self) -> Duration {
        Duration::seconds(self.api_key_validity_seconds)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|value| value.trim().parse().ok())
}

impl Default for UserServiceConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            api_key_validity_seconds: DEFAULT_API_KEY_VALIDITY_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = UserServiceConfig::from_lookup(lookup(&[]));

        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.database, "db_user_service");
        assert_eq!(config.database.user, "user_service_manager");
        assert_eq!(config.database.password, "");
        assert_eq!(config.api_key_validity(), Duration::hours(3));
    }

    #[test]
    fn test_overrides() {
        let config = UserServiceConfig::from_lookup(lookup(&[
            ("DATABASE_HOST", "db.internal"),
            ("DATABASE_PORT", "6543"),
            ("DATABASE_NAME", "users"),
            ("DATABASE_USER", "svc"),
            ("DATABASE_PASSWORD", "pw"),
            ("DATABASE_CONNECT_TIMEOUT", "0"),
            ("DATABASE_POOL_SIZE", "12"),
            ("API_KEY_VALIDITY_SECONDS", "60"),
        ]));

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.database, "users");
        assert_eq!(config.database.user, "svc");
        assert_eq!(config.database.password, "pw");
        assert_eq!(config.database.connect_timeout_secs, 0);
        assert_eq!(config.database.pool_size, 12);
        assert_eq!(config.api_key_validity(), Duration::minutes(1));
    }

    #[test]
    fn test_malformed_numbers_fall_back_to_defaults() {
        let config = UserServiceConfig::from_lookup(lookup(&[
            ("DATABASE_PORT", "not-a-port"),
            ("DATABASE_POOL_SIZE", "-1"),
        ]));

        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.pool_size, 5);
    }
}
