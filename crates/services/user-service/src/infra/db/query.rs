//! Generic row queries.
//!
//! [`query_one`] and [`query_all`] run a statement on a [`Connection`] and map
//! the resulting rows into `T`; the `_tx` variants do the same inside a
//! [`Transaction`]. How a row becomes a `T` is fixed per type by its
//! [`FromRow`] implementation: scalars read the first column, records map
//! columns by name through `sea_orm::FromQueryResult`.

use std::fmt;

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use sea_orm::{DbErr, QueryResult, Value};
use uuid::Uuid;

use common::{AppError, AppResult, ErrorCode};

use super::classifier::classify;
use super::connection::Connection;
use super::transaction::{record_failure, StatementFailure, Transaction};

/// Single-use cursor over the rows returned by a source.
///
/// Rows are pulled from the driver one at a time; dropping the cursor stops
/// reading.
pub struct Rows<'a> {
    stream: BoxStream<'a, Result<QueryResult, DbErr>>,
    failures: Option<&'a mut Option<StatementFailure>>,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(stream: impl Stream<Item = Result<QueryResult, DbErr>> + Send + 'a) -> Self {
        Self {
            stream: stream.boxed(),
            failures: None,
        }
    }

    /// Report read failures to the transaction owning `slot` as well.
    pub(crate) fn recording_failures(mut self, slot: &'a mut Option<StatementFailure>) -> Self {
        self.failures = Some(slot);
        self
    }

    /// Next row, `None` once the rows are exhausted.
    pub async fn next_row(&mut self) -> AppResult<Option<QueryResult>> {
        match self.stream.try_next().await {
            Ok(row) => Ok(row),
            Err(err) => {
                let err = classify(err);
                if let Some(slot) = self.failures.as_deref_mut() {
                    record_failure(slot, &err);
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("in_transaction", &self.failures.is_some())
            .finish_non_exhaustive()
    }
}

/// Conversion of one result row into a value.
pub trait FromRow: Sized {
    fn from_row(row: &QueryResult) -> Result<Self, DbErr>;
}

macro_rules! scalar_from_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &QueryResult) -> Result<Self, DbErr> {
                    row.try_get_by_index(0)
                }
            }
        )*
    };
}

scalar_from_row!(bool, i16, i32, i64, f32, f64, String, Uuid, DateTime<Utc>);

impl<T> FromRow for Option<T>
where
    Option<T>: sea_orm::TryGetable,
{
    fn from_row(row: &QueryResult) -> Result<Self, DbErr> {
        row.try_get_by_index(0)
    }
}

/// Implement [`FromRow`] for record types deriving `sea_orm::FromQueryResult`.
#[macro_export]
macro_rules! record_from_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::infra::db::FromRow for $ty {
                fn from_row(row: &::sea_orm::QueryResult) -> Result<Self, ::sea_orm::DbErr> {
                    <$ty as ::sea_orm::FromQueryResult>::from_query_result(row, "")
                }
            }
        )*
    };
}

/// Fetch exactly one row.
///
/// Zero rows fail with `NoMatchingRows`, more than one with
/// `TooManyMatchingRows`. At most two rows are read.
pub async fn query_one<T: FromRow>(
    conn: &dyn Connection,
    sql: &str,
    args: Vec<Value>,
) -> AppResult<T> {
    let rows = conn
        .query(sql, args)
        .await
        .map_err(|err| wrap_source_failure(err, ErrorCode::QueryOneFailure))?;
    collect_exactly_one(rows).await
}

/// Fetch every matching row, in order. No rows is an empty vector.
pub async fn query_all<T: FromRow>(
    conn: &dyn Connection,
    sql: &str,
    args: Vec<Value>,
) -> AppResult<Vec<T>> {
    let rows = conn
        .query(sql, args)
        .await
        .map_err(|err| wrap_source_failure(err, ErrorCode::QueryAllFailure))?;
    collect_all(rows).await
}

/// [`query_one`] inside a transaction.
pub async fn query_one_tx<T: FromRow>(
    tx: &mut dyn Transaction,
    sql: &str,
    args: Vec<Value>,
) -> AppResult<T> {
    let rows = tx
        .query(sql, args)
        .await
        .map_err(|err| wrap_source_failure(err, ErrorCode::QueryOneFailure))?;
    collect_exactly_one(rows).await
}

/// [`query_all`] inside a transaction.
pub async fn query_all_tx<T: FromRow>(
    tx: &mut dyn Transaction,
    sql: &str,
    args: Vec<Value>,
) -> AppResult<Vec<T>> {
    let rows = tx
        .query(sql, args)
        .await
        .map_err(|err| wrap_source_failure(err, ErrorCode::QueryAllFailure))?;
    collect_all(rows).await
}

// Errors about the state of the source itself are reported as they are.
fn wrap_source_failure(err: AppError, code: ErrorCode) -> AppError {
    const PASS_THROUGH: [ErrorCode; 3] = [
        ErrorCode::NotConnected,
        ErrorCode::AlreadyCommitted,
        ErrorCode::UnsupportedOperation,
    ];

    if PASS_THROUGH.iter().any(|pass| err.is(*pass)) {
        err
    } else {
        AppError::wrap(code, err)
    }
}

async fn collect_exactly_one<T: FromRow>(mut rows: Rows<'_>) -> AppResult<T> {
    let read = |err| wrap_source_failure(err, ErrorCode::QueryOneFailure);

    let row = rows
        .next_row()
        .await
        .map_err(read)?
        .ok_or_else(|| AppError::new(ErrorCode::NoMatchingRows))?;
    if rows.next_row().await.map_err(read)?.is_some() {
        return Err(AppError::new(ErrorCode::TooManyMatchingRows));
    }

    T::from_row(&row).map_err(|err| AppError::wrap(ErrorCode::QueryOneFailure, err))
}

async fn collect_all<T: FromRow>(mut rows: Rows<'_>) -> AppResult<Vec<T>> {
    let mut values = Vec::new();
    while let Some(row) = rows
        .next_row()
        .await
        .map_err(|err| wrap_source_failure(err, ErrorCode::QueryAllFailure))?
    {
        let value =
            T::from_row(&row).map_err(|err| AppError::wrap(ErrorCode::QueryAllFailure, err))?;
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::classifier::tests::pg_exec_error;
    use crate::infra::db::{PgConnection, TxOutcome};
    use async_trait::async_trait;
    use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, MockDatabase, Statement};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq, FromQueryResult)]
    struct Entry {
        id: Uuid,
        name: String,
    }

    crate::record_from_row!(Entry);

    fn entry_row(id: Uuid, name: &str) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("id", Value::from(id)), ("name", Value::from(name))])
    }

    fn scalar_row(value: impl Into<Value>) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("value", value.into())])
    }

    fn connection(db: MockDatabase) -> PgConnection {
        PgConnection::from_pool(db.into_connection())
    }

    /// Connection that only implements the mandatory operations.
    struct OfflineConnection;

    #[async_trait]
    impl Connection for OfflineConnection {
        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }

        async fn begin_tx(&self) -> AppResult<Box<dyn Transaction>> {
            Err(AppError::new(ErrorCode::NotConnected))
        }

        async fn exec(&self, _sql: &str, _args: Vec<Value>) -> AppResult<u64> {
            Ok(0)
        }

        async fn close(&self) {}
    }

    /// Connection handing out prepared rows and counting how many were read.
    struct CountingConnection {
        rows: Mutex<Vec<Result<QueryResult, DbErr>>>,
        pulled: Arc<AtomicUsize>,
    }

    impl CountingConnection {
        async fn new(values: impl IntoIterator<Item = i32>) -> Self {
            let rows: Vec<_> = values.into_iter().map(scalar_row).collect();
            let results = MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([rows])
                .into_connection()
                .query_all(Statement::from_string(DatabaseBackend::Postgres, "SELECT value"))
                .await
                .unwrap();

            Self {
                rows: Mutex::new(results.into_iter().map(Ok).collect()),
                pulled: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_after(self, err: DbErr) -> Self {
            self.rows.lock().unwrap().push(Err(err));
            self
        }

        fn pulled(&self) -> usize {
            self.pulled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connection for CountingConnection {
        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }

        async fn begin_tx(&self) -> AppResult<Box<dyn Transaction>> {
            Err(AppError::new(ErrorCode::UnsupportedOperation))
        }

        async fn exec(&self, _sql: &str, _args: Vec<Value>) -> AppResult<u64> {
            Ok(0)
        }

        async fn query(&self, _sql: &str, _args: Vec<Value>) -> AppResult<Rows<'static>> {
            let rows = std::mem::take(&mut *self.rows.lock().unwrap());
            let pulled = self.pulled.clone();
            Ok(Rows::new(futures::stream::iter(rows).inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })))
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_query_one_stops_after_second_row() {
        let conn = CountingConnection::new(0..1000).await;

        let err = query_one::<i32>(&conn, "SELECT value FROM wide", vec![]).await.unwrap_err();

        assert!(err.is(ErrorCode::TooManyMatchingRows));
        assert_eq!(conn.pulled(), 2);
    }

    #[tokio::test]
    async fn test_query_all_reads_every_row() {
        let conn = CountingConnection::new(0..5).await;

        let values: Vec<i32> = query_all(&conn, "SELECT value FROM narrow", vec![]).await.unwrap();

        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(conn.pulled(), 5);
    }

    #[tokio::test]
    async fn test_read_failure_after_first_rows() {
        let conn = CountingConnection::new(0..2)
            .await
            .failing_after(DbErr::Custom("connection reset".to_string()));

        let err = query_all::<i32>(&conn, "SELECT value FROM flaky", vec![]).await.unwrap_err();

        assert!(err.is(ErrorCode::QueryAllFailure));
        assert!(err.cause().and_then(AppError::as_driver).is_some());
        assert_eq!(conn.pulled(), 3);
    }

    #[tokio::test]
    async fn test_query_one_maps_record_by_name() {
        let id = Uuid::new_v4();
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![entry_row(id, "first")]]),
        );

        let actual: Entry = query_one(&conn, "SELECT id, name FROM entry WHERE id = $1", vec![id.into()])
            .await
            .unwrap();

        assert_eq!(actual, Entry { id, name: "first".to_string() });
    }

    #[tokio::test]
    async fn test_query_one_maps_scalar() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![scalar_row(42i32)]]),
        );

        let actual: i32 = query_one(&conn, "SELECT count(*)::int FROM entry", vec![]).await.unwrap();
        assert_eq!(actual, 42);
    }

    #[tokio::test]
    async fn test_query_one_without_rows() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<BTreeMap<&str, Value>>::new()]),
        );

        let err = query_one::<Entry>(&conn, "SELECT id, name FROM entry", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::NoMatchingRows));
    }

    #[tokio::test]
    async fn test_query_one_with_several_rows() {
        let conn = connection(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![
            entry_row(Uuid::new_v4(), "first"),
            entry_row(Uuid::new_v4(), "second"),
        ]]));

        let err = query_one::<Entry>(&conn, "SELECT id, name FROM entry", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::TooManyMatchingRows));
    }

    #[tokio::test]
    async fn test_query_one_with_undecodable_row() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![scalar_row("text")]]),
        );

        let err = query_one::<i64>(&conn, "SELECT 'text'", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::QueryOneFailure));
        assert!(err.cause().and_then(AppError::as_driver).is_some());
    }

    #[tokio::test]
    async fn test_query_failure_is_classified_and_wrapped() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_errors([pg_exec_error("23505", "duplicate key value")]),
        );

        let err = query_one::<Uuid>(&conn, "INSERT INTO entry (name) VALUES ($1) RETURNING id", vec!["x".into()])
            .await
            .unwrap_err();

        assert!(err.is(ErrorCode::QueryOneFailure));
        assert!(err.cause().unwrap().is(ErrorCode::UniqueConstraintViolation));
    }

    #[tokio::test]
    async fn test_query_all_collects_in_order() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![scalar_row(first), scalar_row(second)]]),
        );

        let actual: Vec<Uuid> = query_all(&conn, "SELECT id FROM entry", vec![]).await.unwrap();
        assert_eq!(actual, vec![first, second]);
    }

    #[tokio::test]
    async fn test_query_all_without_rows_is_empty() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<BTreeMap<&str, Value>>::new()]),
        );

        let actual: Vec<Entry> = query_all(&conn, "SELECT id, name FROM entry", vec![]).await.unwrap();
        assert!(actual.is_empty());
    }

    #[tokio::test]
    async fn test_query_all_failure() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_errors([pg_exec_error("42P01", "relation does not exist")]),
        );

        let err = query_all::<Entry>(&conn, "SELECT id, name FROM missing", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::QueryAllFailure));
        assert!(err.has_code(ErrorCode::GenericSqlError));
    }

    #[tokio::test]
    async fn test_unsupported_source() {
        let err = query_one::<i32>(&OfflineConnection, "SELECT 1", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::UnsupportedOperation));

        let err = query_all::<i32>(&OfflineConnection, "SELECT 1", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::UnsupportedOperation));
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_wrapped() {
        let conn = connection(MockDatabase::new(DatabaseBackend::Postgres));
        conn.close().await;

        let err = query_one::<i32>(&conn, "SELECT 1", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::NotConnected));
        assert!(err.cause().is_none());
    }

    #[tokio::test]
    async fn test_transaction_queries() {
        let id = Uuid::new_v4();
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![entry_row(id, "first")]])
                .append_query_results([vec![scalar_row(id)]]),
        );
        let mut tx = conn.begin_tx().await.unwrap();

        let entry: Entry = query_one_tx(tx.as_mut(), "SELECT id, name FROM entry", vec![]).await.unwrap();
        let ids: Vec<Uuid> = query_all_tx(tx.as_mut(), "SELECT id FROM entry", vec![]).await.unwrap();

        assert_eq!(entry.id, id);
        assert_eq!(ids, vec![id]);
        assert_eq!(tx.close().await.unwrap(), TxOutcome::Committed);

        let err = query_one_tx::<Entry>(tx.as_mut(), "SELECT id, name FROM entry", vec![])
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::AlreadyCommitted));
        assert!(err.cause().is_none());
    }

    #[tokio::test]
    async fn test_no_matching_rows_in_transaction_does_not_roll_back() {
        let conn = connection(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<BTreeMap<&str, Value>>::new()]),
        );
        let mut tx = conn.begin_tx().await.unwrap();

        let err = query_one_tx::<Uuid>(tx.as_mut(), "SELECT id FROM entry", vec![]).await.unwrap_err();
        assert!(err.is(ErrorCode::NoMatchingRows));
        assert_eq!(tx.close().await.unwrap(), TxOutcome::Committed);
    }
}
