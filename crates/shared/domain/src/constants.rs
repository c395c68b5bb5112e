//! Domain-level constants.

// =============================================================================
// API keys
// =============================================================================

/// Default lifetime of an API key issued on login, in seconds (3 hours)
pub const DEFAULT_API_KEY_VALIDITY_SECONDS: i64 = 3 * 60 * 60;

// =============================================================================
// Database defaults
// =============================================================================

/// Name of the database holding users and api keys
pub const DEFAULT_DATABASE_NAME: &str = "db_user_service";

/// Role the service connects as
pub const DEFAULT_DATABASE_USER: &str = "user_service_manager";

/// Default PostgreSQL port
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 5;

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: u32 = 5;
