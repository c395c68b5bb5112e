//! Pooled database connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement, StreamTrait,
    TransactionTrait, Value,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::{AppError, AppResult, DatabaseConfig, ErrorCode};

use super::classifier::classify;
use super::connection_string::connection_string;
use super::query::Rows;
use super::transaction::{PgTransaction, Transaction};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Logical connection to the database.
///
/// Repositories and services depend on this trait only. Every operation
/// fails with `NotConnected` once the connection was closed.
///
/// # Cancellation
///
/// There is no context argument: dropping the future of an operation cancels
/// it. A transaction obtained from [`begin_tx`](Connection::begin_tx) that is
/// dropped before it was closed is rolled back.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Check that the database answers
    async fn ping(&self) -> AppResult<()>;

    /// Start a transaction on a connection borrowed from the pool
    async fn begin_tx(&self) -> AppResult<Box<dyn Transaction>>;

    /// Execute a statement, returning the number of affected rows
    async fn exec(&self, sql: &str, args: Vec<Value>) -> AppResult<u64>;

    /// Run a query and hand back a cursor over its rows.
    ///
    /// Row primitive behind [`query_one`](super::query_one) and
    /// [`query_all`](super::query_all). Connections that cannot provide it
    /// fail with `UnsupportedOperation`.
    async fn query(&self, _sql: &str, _args: Vec<Value>) -> AppResult<Rows<'static>> {
        Err(AppError::new(ErrorCode::UnsupportedOperation))
    }

    /// Release the pool. Calling it again is a no-op.
    async fn close(&self);
}

/// Connection backed by a sea-orm PostgreSQL pool.
///
/// Clones share the same pool; closing one closes it for all of them.
#[derive(Clone)]
pub struct PgConnection {
    pool: Arc<RwLock<Option<Arc<DatabaseConnection>>>>,
}

impl PgConnection {
    /// Create the pool described by `config` and connect to the database.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let mut options = ConnectOptions::new(connection_string(config));
        options
            .max_connections(config.pool_size.max(1))
            .min_connections(1);
        if config.connect_timeout_secs > 0 {
            let timeout = Duration::from_secs(config.connect_timeout_secs);
            options.connect_timeout(timeout).acquire_timeout(timeout);
        }

        let pool = Database::connect(options).await.map_err(classify)?;
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            pool_size = config.pool_size,
            "Database pool created"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wrap an already established pool.
    pub fn from_pool(pool: DatabaseConnection) -> Self {
        Self {
            pool: Arc::new(RwLock::new(Some(Arc::new(pool)))),
        }
    }

    async fn handle(&self) -> AppResult<Arc<DatabaseConnection>> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::new(ErrorCode::NotConnected))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn ping(&self) -> AppResult<()> {
        let handle = self.handle().await?;
        handle
            .execute(Statement::from_string(
                handle.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn begin_tx(&self) -> AppResult<Box<dyn Transaction>> {
        let handle = self.handle().await?;
        let txn = handle.begin().await.map_err(classify)?;
        Ok(Box::new(PgTransaction::new(txn)))
    }

    async fn exec(&self, sql: &str, args: Vec<Value>) -> AppResult<u64> {
        let handle = self.handle().await?;
        let stmt = Statement::from_sql_and_values(handle.get_database_backend(), sql, args);
        let result = handle
            .execute(stmt)
            .await
            .map_err(|err| AppError::wrap(ErrorCode::ExecFailure, classify(err)))?;

        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, args: Vec<Value>) -> AppResult<Rows<'static>> {
        let handle = self.handle().await?;
        let stmt = Statement::from_sql_and_values(handle.get_database_backend(), sql, args);
        // The stream owns a pooled connection until it is dropped
        let stream = handle.stream(stmt).await.map_err(classify)?;

        Ok(Rows::new(stream))
    }

    async fn close(&self) {
        let Some(pool) = self.pool.write().await.take() else {
            return;
        };

        match pool.close_by_ref().await {
            Ok(()) => info!("Database pool closed"),
            Err(err) => warn!(error = %err, "Database pool did not close cleanly"),
        }
    }
}
