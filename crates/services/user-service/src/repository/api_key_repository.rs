//! API key repository.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::AppResult;
use domain::ApiKey;

use super::entities::api_key::Model;
use crate::infra::{query_one, Connection, Transaction};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

// A user owns at most one row: issuing again refreshes the validity of the
// existing row and keeps its id and key.
const CREATE_API_KEY_SQL: &str = r#"
INSERT INTO api_key (id, key, api_user, valid_until)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (api_user) DO UPDATE
    SET
        valid_until = excluded.valid_until
    WHERE
        api_key.api_user = excluded.api_user
    RETURNING
        api_key.id,
        api_key.key,
        api_key.api_user,
        api_key.valid_until"#;

const GET_API_KEY_SQL: &str = r#"
SELECT
    id, key, api_user, valid_until
FROM
    api_key
WHERE
    id = $1"#;

const GET_API_KEY_FOR_KEY_SQL: &str = r#"
SELECT
    id, key, api_user, valid_until
FROM
    api_key
WHERE
    key = $1"#;

const GET_API_KEY_FOR_USER_SQL: &str = r#"
SELECT
    id, key, api_user, valid_until
FROM
    api_key
WHERE
    api_user = $1"#;

const DELETE_API_KEY_FOR_USER_SQL: &str = r#"
DELETE FROM
    api_key
WHERE
    api_user = $1"#;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Store `api_key`, or refresh the validity of the key its user already
    /// owns. Returns the row as written.
    async fn create(&self, api_key: ApiKey) -> AppResult<ApiKey>;

    async fn get(&self, id: Uuid) -> AppResult<ApiKey>;

    /// Find the row holding the bearer `key`
    async fn get_for_key(&self, key: Uuid) -> AppResult<ApiKey>;

    async fn get_for_user(&self, user: Uuid) -> AppResult<ApiKey>;

    /// Delete the key of `user` inside `tx`, returning the number of deleted rows
    async fn delete_for_user(
        &self,
        tx: &mut (dyn Transaction + 'static),
        user: Uuid,
    ) -> AppResult<u64>;
}

pub struct ApiKeyStore {
    conn: Arc<dyn Connection>,
}

impl ApiKeyStore {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    async fn find(&self, sql: &str, id: Uuid) -> AppResult<ApiKey> {
        let model: Model = query_one(self.conn.as_ref(), sql, vec![id.into()]).await?;
        Ok(ApiKey::from(model))
    }
}

#[async_trait]
impl ApiKeyRepository for ApiKeyStore {
    async fn create(&self, api_key: ApiKey) -> AppResult<ApiKey> {
        let model: Model = query_one(
            self.conn.as_ref(),
            CREATE_API_KEY_SQL,
            vec![
                api_key.id.into(),
                api_key.key.into(),
                api_key.api_user.into(),
                api_key.valid_until.into(),
            ],
        )
        .await?;

        Ok(ApiKey::from(model))
    }

    async fn get(&self, id: Uuid) -> AppResult<ApiKey> {
        self.find(GET_API_KEY_SQL, id).await
    }

    async fn get_for_key(&self, key: Uuid) -> AppResult<ApiKey> {
        self.find(GET_API_KEY_FOR_KEY_SQL, key).await
    }

    async fn get_for_user(&self, user: Uuid) -> AppResult<ApiKey> {
        self.find(GET_API_KEY_FOR_USER_SQL, user).await
    }

    async fn delete_for_user(
        &self,
        tx: &mut (dyn Transaction + 'static),
        user: Uuid,
    ) -> AppResult<u64> {
        tx.exec(DELETE_API_KEY_FOR_USER_SQL, vec![user.into()]).await
    }
}
