//! Auth service - resolves bearer api keys.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use common::{AppError, AppResult, ErrorCode};
use domain::ApiKey;

use crate::repository::ApiKeyRepository;

/// Authentication service trait for dependency injection.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve `key` to the api key row it belongs to.
    ///
    /// Unknown keys fail with `UserNotAuthenticated`, keys past their
    /// validity with `AuthenticationExpired`.
    async fn authenticate(&self, key: Uuid) -> AppResult<ApiKey>;
}

/// Concrete implementation of AuthService backed by the api key repository.
pub struct Authenticator {
    api_keys: Arc<dyn ApiKeyRepository>,
}

impl Authenticator {
    pub fn new(api_keys: Arc<dyn ApiKeyRepository>) -> Self {
        Self { api_keys }
    }
}

#[async_trait]
impl AuthService for Authenticator {
    async fn authenticate(&self, key: Uuid) -> AppResult<ApiKey> {
        let api_key = self.api_keys.get_for_key(key).await.map_err(|err| {
            if err.is(ErrorCode::NoMatchingRows) {
                AppError::new(ErrorCode::UserNotAuthenticated)
            } else {
                err
            }
        })?;

        if api_key.is_expired_at(Utc::now()) {
            return Err(AppError::new(ErrorCode::AuthenticationExpired));
        }

        Ok(api_key)
    }
}
