//! Unified error handling.
//!
//! Every failure surfaced by the persistence layer and the services built on
//! it is either:
//! - a [`AppError::Coded`] value carrying one of the stable [`ErrorCode`]s,
//!   optionally wrapping the error that caused it, or
//! - a native driver error the classifier did not recognise, passed through
//!   untouched.
//!
//! Causes form a chain that can be walked one link at a time with
//! [`AppError::cause`] (or `std::error::Error::source`).

use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Closed, integer-keyed set of application error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection and transaction state
    NotConnected,
    UnsupportedOperation,
    AlreadyCommitted,
    ExecFailure,

    // Query facility
    NoMatchingRows,
    TooManyMatchingRows,
    QueryOneFailure,
    QueryAllFailure,

    // Classified driver errors
    GenericSqlError,
    ForeignKeyValidation,
    UniqueConstraintViolation,
    AuthenticationFailed,

    // Repositories
    OptimisticLockException,
    MoreThanOneMatchingEntry,

    // Services
    UserNotAuthenticated,
    AuthenticationExpired,
    InvalidCredentials,
    InvalidEmail,
    InvalidPassword,
}

impl ErrorCode {
    /// Every code, in ascending value order.
    pub const ALL: [ErrorCode; 19] = [
        ErrorCode::NotConnected,
        ErrorCode::UnsupportedOperation,
        ErrorCode::AlreadyCommitted,
        ErrorCode::ExecFailure,
        ErrorCode::NoMatchingRows,
        ErrorCode::TooManyMatchingRows,
        ErrorCode::QueryOneFailure,
        ErrorCode::QueryAllFailure,
        ErrorCode::GenericSqlError,
        ErrorCode::ForeignKeyValidation,
        ErrorCode::UniqueConstraintViolation,
        ErrorCode::AuthenticationFailed,
        ErrorCode::OptimisticLockException,
        ErrorCode::MoreThanOneMatchingEntry,
        ErrorCode::UserNotAuthenticated,
        ErrorCode::AuthenticationExpired,
        ErrorCode::InvalidCredentials,
        ErrorCode::InvalidEmail,
        ErrorCode::InvalidPassword,
    ];

    /// Stable numeric value
    pub const fn value(self) -> i32 {
        match self {
            ErrorCode::NotConnected => 100,
            ErrorCode::UnsupportedOperation => 101,
            ErrorCode::AlreadyCommitted => 102,
            ErrorCode::ExecFailure => 103,
            ErrorCode::NoMatchingRows => 110,
            ErrorCode::TooManyMatchingRows => 111,
            ErrorCode::QueryOneFailure => 112,
            ErrorCode::QueryAllFailure => 113,
            ErrorCode::GenericSqlError => 150,
            ErrorCode::ForeignKeyValidation => 151,
            ErrorCode::UniqueConstraintViolation => 152,
            ErrorCode::AuthenticationFailed => 153,
            ErrorCode::OptimisticLockException => 200,
            ErrorCode::MoreThanOneMatchingEntry => 201,
            ErrorCode::UserNotAuthenticated => 1000,
            ErrorCode::AuthenticationExpired => 1001,
            ErrorCode::InvalidCredentials => 1002,
            ErrorCode::InvalidEmail => 1050,
            ErrorCode::InvalidPassword => 1051,
        }
    }

    /// Canonical human-readable message
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::NotConnected => "Not connected to the database",
            ErrorCode::UnsupportedOperation => "Unsupported operation",
            ErrorCode::AlreadyCommitted => "Transaction already committed",
            ErrorCode::ExecFailure => "Failed to execute statement",
            ErrorCode::NoMatchingRows => "No matching rows",
            ErrorCode::TooManyMatchingRows => "Too many matching rows",
            ErrorCode::QueryOneFailure => "Failed to query single row",
            ErrorCode::QueryAllFailure => "Failed to query rows",
            ErrorCode::GenericSqlError => "SQL error",
            ErrorCode::ForeignKeyValidation => "Foreign key validation failed",
            ErrorCode::UniqueConstraintViolation => "Unique constraint violation",
            ErrorCode::AuthenticationFailed => "Authentication with the database failed",
            ErrorCode::OptimisticLockException => "Entry was modified concurrently",
            ErrorCode::MoreThanOneMatchingEntry => "More than one entry matched",
            ErrorCode::UserNotAuthenticated => "User is not authenticated",
            ErrorCode::AuthenticationExpired => "Authentication expired",
            ErrorCode::InvalidCredentials => "Invalid credentials",
            ErrorCode::InvalidEmail => "Invalid email",
            ErrorCode::InvalidPassword => "Invalid password",
        }
    }

    /// Look a code up by its numeric value.
    pub fn from_value(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.value() == value)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.value(), self.message())
    }
}

/// Application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Failure identified by one of the stable codes
    #[error("{code}")]
    Coded {
        code: ErrorCode,
        #[source]
        cause: Option<Box<AppError>>,
    },

    /// Driver error with a shape the classifier does not know
    #[cfg(feature = "database")]
    #[error(transparent)]
    Driver(#[from] sea_orm::DbErr),
}

impl AppError {
    /// Error with `code` and no cause.
    pub fn new(code: ErrorCode) -> Self {
        AppError::Coded { code, cause: None }
    }

    /// Error with `code` wrapping `cause`.
    pub fn wrap(code: ErrorCode, cause: impl Into<AppError>) -> Self {
        AppError::Coded {
            code,
            cause: Some(Box::new(cause.into())),
        }
    }

    /// Code of this link, `None` for a driver error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Coded { code, .. } => Some(*code),
            #[cfg(feature = "database")]
            AppError::Driver(_) => None,
        }
    }

    /// Whether this link carries `code`.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code() == Some(code)
    }

    /// Whether any link of the chain carries `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.is(code) {
                return true;
            }
            current = err.cause();
        }
        false
    }

    /// Next link of the chain.
    pub fn cause(&self) -> Option<&AppError> {
        match self {
            AppError::Coded { cause, .. } => cause.as_deref(),
            #[cfg(feature = "database")]
            AppError::Driver(_) => None,
        }
    }

    /// The native driver error, if this link is one.
    #[cfg(feature = "database")]
    pub fn as_driver(&self) -> Option<&sea_orm::DbErr> {
        match self {
            AppError::Driver(err) => Some(err),
            AppError::Coded { .. } => None,
        }
    }

    /// Render the whole chain on one line, for logs.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut current = self.cause();
        while let Some(err) = current {
            out.push_str(": ");
            out.push_str(&err.to_string());
            current = err.cause();
        }
        out
    }
}

impl From<ErrorCode> for AppError {
    fn from(code: ErrorCode) -> Self {
        AppError::new(code)
    }
}

// =============================================================================
// Serialization
// =============================================================================

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AppError::Coded { code, cause } => {
                // Driver details of a failed login may echo credentials
                let cause = cause
                    .as_deref()
                    .filter(|_| *code != ErrorCode::AuthenticationFailed);

                let len = if cause.is_some() { 3 } else { 2 };
                let mut state = serializer.serialize_struct("AppError", len)?;
                state.serialize_field("code", &code.value())?;
                state.serialize_field("message", code.message())?;
                if let Some(cause) = cause {
                    state.serialize_field("cause", cause)?;
                }
                state.end()
            }
            #[cfg(feature = "database")]
            AppError::Driver(err) => serializer.serialize_str(&err.to_string()),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;
