//! PostgreSQL backend

use async_trait::async_trait;

use crate::backend::{DeployBackend, SchemaNames};
use crate::config::{Config, EngineConfig};
use crate::db::{quote_ident, DatabaseConnection, SqlExecutor};
use crate::engine::{EngineCommand, EngineOptions};
use crate::error::Result;
use crate::schema::statement::{DdlStatement, StatementKind};

pub struct PostgresBackend {
    executor: SqlExecutor,
    schemas: SchemaNames,
    engine: EngineConfig,
}

impl PostgresBackend {
    pub fn new(connection: DatabaseConnection, schemas: SchemaNames, engine: EngineConfig) -> Self {
        Self {
            executor: SqlExecutor::new(connection),
            schemas,
            engine,
        }
    }

    /// Connect using the `[database]`, `[schema]` and `[engine]` sections
    pub async fn connect(config: &Config) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;
        Ok(Self::new(connection, SchemaNames::from(&config.schema), config.engine.clone()))
    }

    /// DROP statements for `entities`, views before tables
    pub fn drop_statements(schema: &str, entities: &[DdlStatement]) -> Vec<String> {
        let schema = quote_ident(schema);
        let views = entities.iter().filter(|ddl| ddl.kind == StatementKind::View);
        let tables = entities.iter().filter(|ddl| ddl.kind == StatementKind::Table);

        views
            .map(|ddl| format!("DROP VIEW IF EXISTS {}.{} CASCADE", schema, ddl.sql_name()))
            .chain(tables.map(|ddl| format!("DROP TABLE IF EXISTS {}.{} CASCADE", schema, ddl.sql_name())))
            .collect()
    }
}

#[async_trait]
impl DeployBackend for PostgresBackend {
    fn schemas(&self) -> &SchemaNames {
        &self.schemas
    }

    fn options_for(&self, command: EngineCommand) -> EngineOptions {
        let mut options = EngineOptions {
            url: self.engine.url.clone(),
            username: self.engine.username.clone(),
            password: self.engine.password.clone(),
            default_schema_name: self.schemas.default.clone(),
            classpath: self.engine.classpath.clone(),
            driver: Some(
                self.engine
                    .driver
                    .clone()
                    .unwrap_or_else(|| "org.postgresql.Driver".to_string()),
            ),
            log_level: self.engine.log_level.clone(),
            extra_args: self.engine.extra_args.clone(),
            ..EngineOptions::default()
        };

        if command.needs_reference() {
            options.reference_url = Some(self.engine.url.clone());
            options.reference_username = self.engine.username.clone();
            options.reference_password = self.engine.password.clone();
            options.reference_default_schema_name = Some(self.schemas.reference.clone());
        }

        options
    }

    async fn recreate_schema(&self, schema: &str) -> Result<()> {
        tracing::debug!(schema, "Recreating schema");
        let statements = vec![
            format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema)),
            format!("CREATE SCHEMA {}", quote_ident(schema)),
        ];
        self.executor.execute_in_transaction(None, &statements).await
    }

    async fn drop_schema(&self, schema: &str) -> Result<()> {
        tracing::debug!(schema, "Dropping schema");
        let statements = vec![format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema))];
        self.executor.execute_in_transaction(None, &statements).await
    }

    async fn execute_in_schema(&self, schema: &str, statements: &[String]) -> Result<()> {
        self.executor.execute_in_transaction(Some(schema), statements).await
    }

    async fn drop_entities(&self, schema: &str, entities: &[DdlStatement]) -> Result<()> {
        let statements = Self::drop_statements(schema, entities);
        tracing::info!(schema, statements = statements.len(), "Dropping entities");
        self.executor.execute_in_transaction(None, &statements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::statement::classify;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drop_statements_put_views_first() {
        let entities = vec![
            classify("CREATE TABLE books (id INT)").unwrap(),
            classify("CREATE VIEW \"BooksView\" AS SELECT * FROM books").unwrap(),
        ];

        assert_eq!(
            PostgresBackend::drop_statements("public", &entities),
            vec![
                "DROP VIEW IF EXISTS \"public\".\"BooksView\" CASCADE".to_string(),
                "DROP TABLE IF EXISTS \"public\".books CASCADE".to_string(),
            ]
        );
    }
}
