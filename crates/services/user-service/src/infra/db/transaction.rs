//! Unit of work bound to one pooled connection.
//!
//! A transaction remembers the first statement failure it saw and decides on
//! [`Transaction::close`] whether to commit (no failure) or roll back.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseTransaction, Statement, StreamTrait, Value};
use tracing::{debug, error, warn};

use common::{AppError, AppResult, ErrorCode};

use super::classifier::classify;
use super::query::Rows;

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    RolledBack,
}

/// Exclusive unit of work.
///
/// Used by one caller and closed exactly once; every operation after
/// [`close`](Transaction::close) fails with `AlreadyCommitted`.
///
/// # Cancellation
///
/// Dropping the future of an operation abandons it. Dropping a transaction
/// that was never closed rolls it back, so work cut short by a timeout or an
/// aborted task leaves nothing behind.
#[async_trait]
pub trait Transaction: Send {
    /// When the transaction was started
    fn time_stamp(&self) -> DateTime<Utc>;

    /// Execute a statement, returning the number of affected rows
    async fn exec(&mut self, sql: &str, args: Vec<Value>) -> AppResult<u64>;

    /// Row primitive behind [`query_one_tx`](super::query_one_tx) and
    /// [`query_all_tx`](super::query_all_tx).
    ///
    /// The rows borrow the transaction until they are dropped.
    async fn query<'a>(&'a mut self, _sql: &str, _args: Vec<Value>) -> AppResult<Rows<'a>> {
        Err(AppError::new(ErrorCode::UnsupportedOperation))
    }

    /// Commit if no statement failed, roll back otherwise
    async fn close(&mut self) -> AppResult<TxOutcome>;
}

// `query` ties its rows to the transaction, which `automock` cannot express;
// the double keeps the default `UnsupportedOperation` for it.
#[cfg(any(test, feature = "test-utils"))]
mockall::mock! {
    pub Transaction {}

    #[async_trait]
    impl Transaction for Transaction {
        fn time_stamp(&self) -> DateTime<Utc>;
        async fn exec(&mut self, sql: &str, args: Vec<Value>) -> AppResult<u64>;
        async fn close(&mut self) -> AppResult<TxOutcome>;
    }
}

/// The first failure recorded by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    code: Option<ErrorCode>,
    chain: Vec<ErrorCode>,
    report: String,
}

impl StatementFailure {
    fn of(err: &AppError) -> Self {
        let mut chain = Vec::new();
        let mut current = Some(err);
        while let Some(link) = current {
            chain.extend(link.code());
            current = link.cause();
        }

        Self {
            code: err.code(),
            chain,
            report: err.report(),
        }
    }

    /// Code of the outermost link, `None` for an unclassified driver error
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Whether any link of the failure carried `code`
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.chain.contains(&code)
    }
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report)
    }
}

/// Keep `err` in `slot` unless an earlier failure is already there.
pub(crate) fn record_failure(slot: &mut Option<StatementFailure>, err: &AppError) {
    if slot.is_none() {
        *slot = Some(StatementFailure::of(err));
    }
}

/// Transaction over a sea-orm [`DatabaseTransaction`].
pub struct PgTransaction {
    started_at: DateTime<Utc>,
    // `None` once closed
    txn: Option<DatabaseTransaction>,
    first_failure: Option<StatementFailure>,
}

impl PgTransaction {
    pub(crate) fn new(txn: DatabaseTransaction) -> Self {
        let started_at = Utc::now();
        debug!(%started_at, "Transaction started");
        Self {
            started_at,
            txn: Some(txn),
            first_failure: None,
        }
    }

    fn handle(&self) -> AppResult<&DatabaseTransaction> {
        self.txn
            .as_ref()
            .ok_or_else(|| AppError::new(ErrorCode::AlreadyCommitted))
    }

    /// Whether a statement of this transaction already failed.
    pub fn has_failed(&self) -> bool {
        self.first_failure.is_some()
    }

    /// The failure that will make [`close`](Transaction::close) roll back.
    pub fn first_failure(&self) -> Option<&StatementFailure> {
        self.first_failure.as_ref()
    }

    /// Whether [`close`](Transaction::close) was called.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn time_stamp(&self) -> DateTime<Utc> {
        self.started_at
    }

    async fn exec(&mut self, sql: &str, args: Vec<Value>) -> AppResult<u64> {
        let txn = self.handle()?;
        let stmt = Statement::from_sql_and_values(txn.get_database_backend(), sql, args);

        let result = txn.execute(stmt).await;
        match result {
            Ok(result) => Ok(result.rows_affected()),
            Err(err) => {
                let err = AppError::wrap(ErrorCode::ExecFailure, classify(err));
                record_failure(&mut self.first_failure, &err);
                Err(err)
            }
        }
    }

    async fn query<'a>(&'a mut self, sql: &str, args: Vec<Value>) -> AppResult<Rows<'a>> {
        let Some(txn) = self.txn.as_ref() else {
            return Err(AppError::new(ErrorCode::AlreadyCommitted));
        };
        let stmt = Statement::from_sql_and_values(txn.get_database_backend(), sql, args);

        match txn.stream(stmt).await {
            Ok(stream) => Ok(Rows::new(stream).recording_failures(&mut self.first_failure)),
            Err(err) => {
                let err = classify(err);
                record_failure(&mut self.first_failure, &err);
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> AppResult<TxOutcome> {
        let Some(txn) = self.txn.take() else {
            return Err(AppError::new(ErrorCode::AlreadyCommitted));
        };
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();

        match &self.first_failure {
            None => {
                txn.commit().await.map_err(|err| {
                    error!(error = %err, "Transaction commit failed");
                    classify(err)
                })?;
                debug!(elapsed_ms, "Transaction committed");
                Ok(TxOutcome::Committed)
            }
            Some(failure) => {
                warn!(elapsed_ms, error = %failure, "Rolling back transaction");
                txn.rollback().await.map_err(|err| {
                    error!(error = %err, "Transaction rollback failed");
                    classify(err)
                })?;
                Ok(TxOutcome::RolledBack)
            }
        }
    }
}
