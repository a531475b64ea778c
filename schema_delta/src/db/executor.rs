//! SQL executor
//!
//! Runs batches of statements atomically, optionally scoped to one schema.

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};

/// Quote an identifier for PostgreSQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL executor for running statement batches
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connection: DatabaseConnection,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Execute statements in one transaction, resolving unqualified names in `schema`
    ///
    /// Either every statement is committed or none is: returning early drops
    /// the transaction, which rolls it back.
    pub async fn execute_in_transaction(&self, schema: Option<&str>, statements: &[String]) -> Result<()> {
        match &self.connection {
            DatabaseConnection::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| Error::TransactionFailure(format!("could not begin: {}", e)))?;

                if let Some(schema) = schema {
                    let search_path = format!("SET LOCAL search_path TO {}", quote_ident(schema));
                    sqlx::query(&search_path).execute(&mut *tx).await?;
                }

                for (index, statement) in statements.iter().enumerate() {
                    if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                        tracing::error!(statement_number = index + 1, error = %e, "Statement failed, rolling back");
                        return Err(Error::TransactionFailure(format!(
                            "statement {} of {} failed: {}",
                            index + 1,
                            statements.len(),
                            e
                        )));
                    }
                }

                tx.commit()
                    .await
                    .map_err(|e| Error::TransactionFailure(format!("commit failed: {}", e)))?;
                Ok(())
            }
        }
    }
}
