//! User repository with optimistic concurrency on updates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::{AppError, AppResult, ErrorCode};
use domain::User;

use super::entities::user::Model;
use crate::infra::{query_all, query_one, query_one_tx, Connection, Transaction};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

const CREATE_USER_SQL: &str = r#"
INSERT INTO api_user (id, email, password, created_at)
    VALUES ($1, $2, $3, $4)
    RETURNING updated_at"#;

const GET_USER_SQL: &str = r#"
SELECT
    id, email, password, created_at, updated_at, version
FROM
    api_user
WHERE
    id = $1"#;

const GET_USER_BY_EMAIL_SQL: &str = r#"
SELECT
    id, email, password, created_at, updated_at, version
FROM
    api_user
WHERE
    email = $1"#;

const LIST_USERS_SQL: &str = r#"
SELECT
    id
FROM
    api_user"#;

const UPDATE_USER_RETURNING_SQL: &str = r#"
UPDATE
    api_user
SET
    email = $1,
    password = $2,
    version = $3
WHERE
    id = $4
    AND version = $5
RETURNING
    updated_at"#;

const UPDATE_USER_SQL: &str = r#"
UPDATE
    api_user
SET
    email = $1,
    password = $2,
    version = $3
WHERE
    id = $4
    AND version = $5"#;

const GET_USER_UPDATED_AT_SQL: &str = r#"
SELECT
    updated_at
FROM
    api_user
WHERE
    id = $1"#;

const DELETE_USER_SQL: &str = r#"
DELETE FROM
    api_user
WHERE
    id = $1"#;

/// User repository trait for dependency injection.
///
/// Updates are optimistic: the caller hands back the `version` it read and the
/// write only goes through when the stored version still matches.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, returning it with the stored `updated_at`
    async fn create(&self, user: User) -> AppResult<User>;

    /// Find user by ID
    async fn get(&self, id: Uuid) -> AppResult<User>;

    /// Find user by email address
    async fn get_by_email(&self, email: &str) -> AppResult<User>;

    /// Ids of all users
    async fn list(&self) -> AppResult<Vec<Uuid>>;

    /// Write `user` if its version is still current.
    ///
    /// Fails with `OptimisticLockException` when the row changed (or vanished)
    /// since it was read.
    async fn update(&self, user: User) -> AppResult<User>;

    /// Same contract as [`update`](UserRepository::update), expressed as a
    /// plain statement inside `tx` and checked through its affected-row count.
    async fn update_counted(
        &self,
        tx: &mut (dyn Transaction + 'static),
        user: User,
    ) -> AppResult<User>;

    /// Delete the user inside `tx`, returning the number of deleted rows
    async fn delete(&self, tx: &mut (dyn Transaction + 'static), id: Uuid) -> AppResult<u64>;
}

/// Concrete implementation of UserRepository
pub struct UserStore {
    conn: Arc<dyn Connection>,
}

impl UserStore {
    /// Create new repository instance
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn create(&self, mut user: User) -> AppResult<User> {
        let updated_at: DateTime<Utc> = query_one(
            self.conn.as_ref(),
            CREATE_USER_SQL,
            vec![
                user.id.into(),
                user.email.clone().into(),
                user.password.clone().into(),
                user.created_at.into(),
            ],
        )
        .await?;

        user.updated_at = updated_at;
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> AppResult<User> {
        let model: Model = query_one(self.conn.as_ref(), GET_USER_SQL, vec![id.into()]).await?;
        Ok(User::from(model))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let model: Model =
            query_one(self.conn.as_ref(), GET_USER_BY_EMAIL_SQL, vec![email.into()]).await?;
        Ok(User::from(model))
    }

    async fn list(&self) -> AppResult<Vec<Uuid>> {
        query_all(self.conn.as_ref(), LIST_USERS_SQL, vec![]).await
    }

    async fn update(&self, mut user: User) -> AppResult<User> {
        let version = next_version(&user)?;

        let updated_at: DateTime<Utc> = query_one(
            self.conn.as_ref(),
            UPDATE_USER_RETURNING_SQL,
            update_args(&user, version),
        )
        .await
        .map_err(|err| {
            if err.is(ErrorCode::NoMatchingRows) {
                AppError::new(ErrorCode::OptimisticLockException)
            } else {
                err
            }
        })?;

        user.version = version;
        user.updated_at = updated_at;
        Ok(user)
    }

    async fn update_counted(
        &self,
        tx: &mut (dyn Transaction + 'static),
        mut user: User,
    ) -> AppResult<User> {
        let version = next_version(&user)?;

        let affected = tx.exec(UPDATE_USER_SQL, update_args(&user, version)).await?;
        match affected {
            0 => return Err(AppError::new(ErrorCode::OptimisticLockException)),
            1 => {}
            _ => return Err(AppError::new(ErrorCode::MoreThanOneMatchingEntry)),
        }

        let updated_at: DateTime<Utc> =
            query_one_tx(tx, GET_USER_UPDATED_AT_SQL, vec![user.id.into()]).await?;

        user.version = version;
        user.updated_at = updated_at;
        Ok(user)
    }

    async fn delete(&self, tx: &mut (dyn Transaction + 'static), id: Uuid) -> AppResult<u64> {
        tx.exec(DELETE_USER_SQL, vec![id.into()]).await
    }
}

// A version at `i32::MAX` cannot be advanced; no write can win against it.
fn next_version(user: &User) -> AppResult<i32> {
    user.version
        .checked_add(1)
        .ok_or_else(|| AppError::new(ErrorCode::OptimisticLockException))
}

fn update_args(user: &User, version: i32) -> Vec<sea_orm::Value> {
    vec![
        user.email.clone().into(),
        user.password.clone().into(),
        version.into(),
        user.id.into(),
        user.version.into(),
    ]
}
