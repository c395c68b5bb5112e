//! Classification of native driver errors into the stable error codes.

use sea_orm::{sqlx, DbErr, RuntimeErr};

use common::{AppError, ErrorCode};

// https://www.postgresql.org/docs/current/errcodes-appendix.html
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";
const INVALID_PASSWORD: &str = "28P01";

/// Message PostgreSQL reports when the password of a role is rejected.
const INVALID_PASSWORD_MARKER: &str = "password authentication failed";

/// Rewrite a driver error into a classified [`AppError`].
///
/// Errors carrying a SQL state are wrapped with a code and keep the original
/// as their cause. Any other shape is returned unchanged as
/// [`AppError::Driver`].
pub fn classify(err: DbErr) -> AppError {
    match sql_state_code(&err) {
        Some(code) => AppError::wrap(code, err),
        None => AppError::Driver(err),
    }
}

fn sql_state_code(err: &DbErr) -> Option<ErrorCode> {
    let runtime = match err {
        DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return None,
    };
    let RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) = runtime else {
        return None;
    };

    Some(code_for_sql_state(db_err.code().as_deref(), db_err.message()))
}

fn code_for_sql_state(state: Option<&str>, message: &str) -> ErrorCode {
    match state {
        Some(FOREIGN_KEY_VIOLATION) => ErrorCode::ForeignKeyValidation,
        Some(UNIQUE_VIOLATION) => ErrorCode::UniqueConstraintViolation,
        Some(INVALID_PASSWORD) => ErrorCode::AuthenticationFailed,
        _ if message.contains(INVALID_PASSWORD_MARKER) => ErrorCode::AuthenticationFailed,
        _ => ErrorCode::GenericSqlError,
    }
}
