//! Database module for schema_delta
//!
//! This module handles database connections and transactional execution.

pub mod connection;
pub mod executor;

// Re-export key types
pub use connection::DatabaseConnection;
pub use executor::{quote_ident, SqlExecutor};
