//! User service - account lifecycle and login.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use common::{AppError, AppResult, ErrorCode};
use domain::{ApiKey, User};

use crate::infra::{Connection, Transaction};
use crate::repository::{ApiKeyRepository, Repositories, UserRepository};

/// User service trait for dependency injection.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Register a new user
    async fn create(&self, email: String, password: String) -> AppResult<User>;

    async fn get(&self, id: Uuid) -> AppResult<User>;

    /// Ids of all users
    async fn list(&self) -> AppResult<Vec<Uuid>>;

    /// Replace email and password of an existing user
    async fn update(&self, id: Uuid, email: String, password: String) -> AppResult<User>;

    /// Remove the user and its api key. Deleting an unknown user succeeds.
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Check the credentials and hand out an api key
    async fn login(&self, email: &str, password: &str) -> AppResult<ApiKey>;

    /// Revoke the api key of an existing user
    async fn logout(&self, id: Uuid) -> AppResult<()>;
}

/// Concrete implementation of UserService using the repositories.
pub struct UserManager {
    conn: Arc<dyn Connection>,
    users: Arc<dyn UserRepository>,
    api_keys: Arc<dyn ApiKeyRepository>,
    api_key_validity: Duration,
}

impl UserManager {
    pub fn new(conn: Arc<dyn Connection>, repos: Repositories, api_key_validity: Duration) -> Self {
        Self {
            conn,
            users: repos.user,
            api_keys: repos.api_key,
            api_key_validity,
        }
    }

    async fn delete_in(&self, tx: &mut (dyn Transaction + 'static), id: Uuid) -> AppResult<()> {
        let keys = self.api_keys.delete_for_user(tx, id).await?;
        let users = self.users.delete(tx, id).await?;
        debug!(user = %id, keys, users, "Deleted user");
        Ok(())
    }
}

/// Close `tx` and hand back `result`.
///
/// The error of the work itself wins over an error raised while closing.
async fn finish<T>(tx: &mut dyn Transaction, result: AppResult<T>) -> AppResult<T> {
    let closed = tx.close().await;
    let value = result?;
    closed?;
    Ok(value)
}

#[async_trait]
impl UserService for UserManager {
    async fn create(&self, email: String, password: String) -> AppResult<User> {
        if email.is_empty() {
            return Err(AppError::new(ErrorCode::InvalidEmail));
        }
        if password.is_empty() {
            return Err(AppError::new(ErrorCode::InvalidPassword));
        }

        self.users.create(User::new(email, password)).await
    }

    async fn get(&self, id: Uuid) -> AppResult<User> {
        self.users.get(id).await
    }

    async fn list(&self) -> AppResult<Vec<Uuid>> {
        self.users.list().await
    }

    async fn update(&self, id: Uuid, email: String, password: String) -> AppResult<User> {
        let mut user = self.users.get(id).await?;
        user.email = email;
        user.password = password;

        self.users.update(user).await
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.conn.begin_tx().await?;
        let result = self.delete_in(tx.as_mut(), id).await;
        finish(tx.as_mut(), result).await
    }

    async fn login(&self, email: &str, password: &str) -> AppResult<ApiKey> {
        let user = self.users.get_by_email(email).await?;
        if user.password != password {
            return Err(AppError::new(ErrorCode::InvalidCredentials));
        }

        let requested = ApiKey::issue(user.id, Utc::now() + self.api_key_validity);
        self.api_keys.create(requested).await
    }

    async fn logout(&self, id: Uuid) -> AppResult<()> {
        self.users.get(id).await?;

        let mut tx = self.conn.begin_tx().await?;
        let result = self.api_keys.delete_for_user(tx.as_mut(), id).await;
        finish(tx.as_mut(), result).await.map(|_| ())
    }
}
