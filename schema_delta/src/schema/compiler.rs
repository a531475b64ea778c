//! Model compilers
//!
//! A compiler turns the declarative model into the ordered DDL statements
//! that create it. The orchestrator receives one as an explicit dependency.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::{CompilerKind, ModelConfig};
use crate::error::{Error, Result};

/// Compiles a model into DDL statements
#[async_trait]
pub trait ModelCompiler: Send + Sync {
    async fn compile(&self, model: &Path) -> Result<Vec<String>>;
}

/// Build the compiler selected by configuration
pub fn from_config(config: &ModelConfig) -> Result<Box<dyn ModelCompiler>> {
    match config.compiler {
        CompilerKind::Sql => Ok(Box::new(SqlFileCompiler)),
        CompilerKind::Command => {
            let command = config.command.clone().ok_or_else(|| {
                Error::ConfigError("model.command is required for the command compiler".to_string())
            })?;
            Ok(Box::new(CommandCompiler::new(command)))
        }
    }
}

/// Reads `.sql` files: a single file, a directory tree or a glob pattern
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlFileCompiler;

impl SqlFileCompiler {
    fn model_files(model: &Path) -> Result<Vec<PathBuf>> {
        if model.is_file() {
            return Ok(vec![model.to_path_buf()]);
        }

        if model.is_dir() {
            let mut files: Vec<PathBuf> = WalkDir::new(model)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "sql"))
                .collect();
            files.dedup();
            return Ok(files);
        }

        let pattern = model
            .to_str()
            .ok_or_else(|| Error::ModelCompilation(format!("Non UTF-8 model path: {}", model.display())))?;
        let mut files = Vec::new();
        for entry in glob::glob(pattern)
            .map_err(|e| Error::ModelCompilation(format!("Invalid model pattern {}: {}", pattern, e)))?
        {
            let path = entry.map_err(|e| Error::IoError(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl ModelCompiler for SqlFileCompiler {
    async fn compile(&self, model: &Path) -> Result<Vec<String>> {
        let files = Self::model_files(model)?;
        if files.is_empty() {
            return Err(Error::ModelCompilation(format!(
                "No model files found at {}",
                model.display()
            )));
        }

        let mut statements = Vec::new();
        for file in &files {
            let source = tokio::fs::read_to_string(file).await?;
            let before = statements.len();
            statements.extend(split_statements(&source));
            tracing::debug!(file = %file.display(), statements = statements.len() - before, "Compiled model file");
        }

        Ok(statements)
    }
}

/// Runs an external compiler and splits its standard output into statements
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command_line: String,
}

impl CommandCompiler {
    /// `command_line` is split on whitespace; `{model}` is replaced by the model path
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
        }
    }
}

#[async_trait]
impl ModelCompiler for CommandCompiler {
    async fn compile(&self, model: &Path) -> Result<Vec<String>> {
        let model = model.to_string_lossy();
        let mut parts: Vec<String> = self
            .command_line
            .split_whitespace()
            .map(|part| part.replace("{model}", &model))
            .collect();
        if parts.is_empty() {
            return Err(Error::ModelCompilation("Empty compiler command".to_string()));
        }
        let program = parts.remove(0);

        tracing::debug!(program = %program, "Running model compiler");
        let output = Command::new(&program)
            .args(&parts)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ModelCompilation(format!("failed to start {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(Error::ModelCompilation(format!(
                "`{}` exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(split_statements(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Split a script on `;`, ignoring semicolons in literals, quoted identifiers and comments
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    let mut push = |current: &mut String| {
        let statement = current.trim();
        if !statement.is_empty() {
            statements.push(statement.to_string());
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                current.push(c);
                while let Some(n) = chars.next() {
                    current.push(n);
                    if n == c {
                        if chars.peek() == Some(&c) {
                            current.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut last = '\0';
                for n in chars.by_ref() {
                    if last == '*' && n == '/' {
                        break;
                    }
                    last = n;
                }
                current.push(' ');
            }
            ';' => push(&mut current),
            _ => current.push(c),
        }
    }
    push(&mut current);

    statements
}
