//! User Service Library
//!
//! Persistence for user accounts and their api keys on PostgreSQL, plus the
//! services built on top of it.

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use common::AppResult;

use crate::config::UserServiceConfig;
use crate::infra::{Connection, PgConnection};
use crate::repository::Repositories;
use crate::service::{UserManager, UserService};

/// Connect, check that the database answers and disconnect.
pub async fn run_ping(config: &UserServiceConfig) -> AppResult<()> {
    let conn = PgConnection::connect(&config.database).await?;
    let result = conn.ping().await;
    conn.close().await;

    result?;
    info!(host = %config.database.host, "Database is reachable");
    Ok(())
}

/// Ids of all registered users.
pub async fn run_list_users(config: &UserServiceConfig) -> AppResult<Vec<Uuid>> {
    let conn: Arc<dyn Connection> = Arc::new(PgConnection::connect(&config.database).await?);
    let users = UserManager::new(
        conn.clone(),
        Repositories::new(conn.clone()),
        config.api_key_validity(),
    );

    let result = users.list().await;
    conn.close().await;
    result
}
