//! PostgreSQL connection URI generation.
//!
//! Produces `postgresql://[user[:password]@][host][:port][/database][?connect_timeout=N]`,
//! leaving out every segment that is not configured. Credentials and host are
//! percent-encoded so that reserved characters survive the round trip.

use common::DatabaseConfig;

const CONNECTION_STRING_PREFIX: &str = "postgresql://";

// https://www.postgresql.org/docs/current/libpq-connect.html#LIBPQ-CONNECT-CONNECT-TIMEOUT
const CONNECT_TIMEOUT_KEY: &str = "connect_timeout";

/// Build the driver connection string for `config`.
///
/// Never fails: an unreachable or malformed host is only detected when
/// connecting.
pub fn connection_string(config: &DatabaseConfig) -> String {
    let user = user_info(&config.user, &config.password);
    let host = host_port(&config.host, config.port);

    let mut out = String::from(CONNECTION_STRING_PREFIX);
    if !user.is_empty() {
        out.push_str(&user);
        out.push('@');
    }
    out.push_str(&host);
    if !config.database.is_empty() {
        out.push('/');
        out.push_str(&urlencoding::encode(&config.database));
    }
    if config.connect_timeout_secs > 0 {
        out.push('?');
        out.push_str(&format!("{}={}", CONNECT_TIMEOUT_KEY, config.connect_timeout_secs));
    }

    out
}

fn user_info(user: &str, password: &str) -> String {
    match (user.is_empty(), password.is_empty()) {
        (true, true) => String::new(),
        (false, true) => urlencoding::encode(user).into_owned(),
        _ => format!("{}:{}", urlencoding::encode(user), urlencoding::encode(password)),
    }
}

fn host_port(host: &str, port: u16) -> String {
    let host = urlencoding::encode(host);
    if port == 0 {
        host.into_owned()
    } else {
        format!("{}:{}", host, port)
    }
}
