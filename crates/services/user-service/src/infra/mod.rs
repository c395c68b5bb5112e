//! Infrastructure layer - database access.

pub mod db;

pub use db::{
    classify, connection_string, query_all, query_all_tx, query_one, query_one_tx, Connection,
    FromRow, PgConnection, PgTransaction, Rows, StatementFailure, Transaction, TxOutcome,
};

#[cfg(any(test, feature = "test-utils"))]
pub use db::{MockConnection, MockTransaction};
