//! Database connection handling
//!
//! This module provides functionality to establish and manage database connections.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Pooled connection to the database holding all three schemas
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(PgPool),
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_size = config.pool_size.unwrap_or(5);
        let timeout_seconds = config.timeout_seconds.unwrap_or(30);

        match config.driver.as_str() {
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(Duration::from_secs(timeout_seconds))
                    .connect(&config.url)
                    .await?;

                tracing::debug!(pool_size, "Connected to postgres");
                Ok(DatabaseConnection::Postgres(pool))
            }
            _ => Err(Error::DatabaseError(format!(
                "Unsupported database driver: {}",
                config.driver
            ))),
        }
    }
}
