//! Repository layer for data access.

pub mod entities;
mod api_key_repository;
mod user_repository;

use std::sync::Arc;

use crate::infra::Connection;

pub use api_key_repository::{ApiKeyRepository, ApiKeyStore};
pub use user_repository::{UserRepository, UserStore};

#[cfg(any(test, feature = "test-utils"))]
pub use api_key_repository::MockApiKeyRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use user_repository::MockUserRepository;

/// Every repository the services need, sharing one connection.
#[derive(Clone)]
pub struct Repositories {
    pub user: Arc<dyn UserRepository>,
    pub api_key: Arc<dyn ApiKeyRepository>,
}

impl Repositories {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            user: Arc::new(UserStore::new(conn.clone())),
            api_key: Arc::new(ApiKeyStore::new(conn)),
        }
    }
}
