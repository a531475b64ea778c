//! Liquibase command-line adapter

use async_trait::async_trait;
use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::engine::{DiffEngine, EngineCommand, EngineOptions, EngineOutput};
use crate::error::{Error, Result};

/// Runs the Liquibase CLI as a child process
#[derive(Debug, Clone)]
pub struct LiquibaseEngine {
    program: String,
}

impl LiquibaseEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.command.clone())
    }

    /// Command line arguments for `command`, without the program name
    pub fn arguments(command: EngineCommand, options: &EngineOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut flag = |name: &str, value: &str| args.push(format!("--{}={}", name, value).into());

        flag("url", &options.url);
        if let Some(username) = &options.username {
            flag("username", username);
        }
        if let Some(password) = &options.password {
            flag("password", password);
        }
        flag("defaultSchemaName", &options.default_schema_name);
        if let Some(classpath) = &options.classpath {
            flag("classpath", classpath);
        }
        if let Some(driver) = &options.driver {
            flag("driver", driver);
        }
        if let Some(level) = &options.log_level {
            flag("logLevel", level);
        }
        if let Some(path) = &options.change_log_file {
            flag("changeLogFile", &path.to_string_lossy());
        }
        if let Some(path) = &options.output_file {
            flag("outputFile", &path.to_string_lossy());
        }

        if command.needs_reference() {
            flag("referenceUrl", options.reference_url.as_deref().unwrap_or(&options.url));
            if let Some(username) = options.reference_username.as_ref().or(options.username.as_ref()) {
                flag("referenceUsername", username);
            }
            if let Some(password) = options.reference_password.as_ref().or(options.password.as_ref()) {
                flag("referencePassword", password);
            }
            if let Some(schema) = &options.reference_default_schema_name {
                flag("referenceDefaultSchemaName", schema);
            }
        }

        args.extend(options.extra_args.iter().map(OsString::from));
        args.push(command.as_str().into());
        args
    }
}

#[async_trait]
impl DiffEngine for LiquibaseEngine {
    async fn run(&self, command: EngineCommand, options: &EngineOptions) -> Result<EngineOutput> {
        tracing::info!(
            command = %command,
            target = %options.default_schema_name,
            reference = options.reference_default_schema_name.as_deref().unwrap_or("-"),
            "Running liquibase"
        );

        let output = Command::new(&self.program)
            .args(Self::arguments(command, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::engine(command, format!("failed to start {}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let message = match stderr.trim() {
                "" => format!("exited with {}", output.status),
                text => text.to_string(),
            };
            return Err(Error::engine(command, message));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(command = %command, stderr = %stderr.trim(), "Liquibase diagnostics");
        }

        match command {
            EngineCommand::Diff | EngineCommand::UpdateSql if options.output_file.is_none() => Ok(
                EngineOutput::Text(String::from_utf8_lossy(&output.stdout).into_owned()),
            ),
            _ => Ok(EngineOutput::Done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> EngineOptions {
        EngineOptions {
            url: "jdbc:postgresql://localhost:5432/shop".to_string(),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            default_schema_name: "public".to_string(),
            ..EngineOptions::default()
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_update_arguments_end_with_command() {
        let args = strings(LiquibaseEngine::arguments(
            EngineCommand::Update,
            &options().with_change_log(PathBuf::from("/tmp/c.yaml")),
        ));
        assert_eq!(args.last().map(String::as_str), Some("update"));
        assert!(args.contains(&"--changeLogFile=/tmp/c.yaml".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--reference")));
    }

    #[test]
    fn test_diff_arguments_reuse_connection_for_reference() {
        let args = strings(LiquibaseEngine::arguments(
            EngineCommand::DiffChangeLog,
            &options().with_target("_clone").with_reference("_ref"),
        ));
        assert!(args.contains(&"--defaultSchemaName=_clone".to_string()));
        assert!(args.contains(&"--referenceUrl=jdbc:postgresql://localhost:5432/shop".to_string()));
        assert!(args.contains(&"--referenceUsername=admin".to_string()));
        assert!(args.contains(&"--referenceDefaultSchemaName=_ref".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("diffChangeLog"));
    }

    #[tokio::test]
    async fn test_missing_program_is_engine_failure() {
        let engine = LiquibaseEngine::new("schema-delta-no-such-program");
        let result = engine.run(EngineCommand::Update, &options()).await;
        assert!(matches!(result, Err(Error::ExternalEngineFailure { .. })));
    }
}
