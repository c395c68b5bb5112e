//! Database access: pooled connection, transactions, generic row queries
//! and classification of driver errors.
//!
//! Everything above this module talks to the [`Connection`] and
//! [`Transaction`] traits only; [`PgConnection`] and [`PgTransaction`] are the
//! production implementations backed by a sea-orm connection pool.

pub(crate) mod classifier;
mod connection;
mod connection_string;
mod query;
mod transaction;

pub use classifier::classify;
pub use connection::{Connection, PgConnection};
pub use connection_string::connection_string;
pub use query::{query_all, query_all_tx, query_one, query_one_tx, FromRow, Rows};
pub use transaction::{PgTransaction, StatementFailure, Transaction, TxOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use connection::MockConnection;
#[cfg(any(test, feature = "test-utils"))]
pub use transaction::MockTransaction;
