//! Scoped temporary changelog files
//!
//! Every intermediate changelog lives in a [`TempChangeLog`] handle that
//! removes its file when dropped, so success and error paths clean up alike.
//! Files left behind by a crashed run are found by prefix and removed by
//! [`ScratchDir::sweep_stale`] before the next run starts.

use chrono::{DateTime, Local};
use glob::Pattern;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::changelog::types::ChangeLog;
use crate::error::{Error, Result};

/// Directory and file prefix under which temporary changelogs are created
#[derive(Debug, Clone)]
pub struct ScratchDir {
    dir: PathBuf,
    prefix: String,
}

impl ScratchDir {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a new, not yet existing, temporary changelog path
    pub fn allocate(&self, label: &str) -> Result<TempChangeLog> {
        fs::create_dir_all(&self.dir)?;
        let file_name = format!("{}-{}-{}.yaml", self.prefix, label, uuid::Uuid::new_v4().simple());
        Ok(TempChangeLog {
            path: self.dir.join(file_name),
        })
    }

    /// Write `changelog` into a fresh temporary file
    pub fn persist(&self, label: &str, changelog: &ChangeLog) -> Result<TempChangeLog> {
        let handle = self.allocate(label)?;
        changelog.save(handle.path())?;
        Ok(handle)
    }

    /// Delete temporary changelogs left over by aborted runs
    pub fn sweep_stale(&self) -> Result<Vec<PathBuf>> {
        let dir = self
            .dir
            .to_str()
            .ok_or_else(|| Error::ConfigError(format!("Non UTF-8 scratch directory: {}", self.dir.display())))?;
        let pattern = Path::new(&Pattern::escape(dir)).join(format!("{}-*", Pattern::escape(&self.prefix)));
        let pattern = pattern.to_string_lossy();

        let entries = glob::glob(&pattern)
            .map_err(|e| Error::ConfigError(format!("Invalid scratch pattern {}: {}", pattern, e)))?;

        let mut removed = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::IoError(e.into_error()))?;
            if !path.is_file() {
                continue;
            }

            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .map(|time| DateTime::<Local>::from(time).to_rfc3339())
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::warn!(modified = %modified, "{}", Error::StaleTempFile(path.clone()));

            fs::remove_file(&path)?;
            removed.push(path);
        }

        Ok(removed)
    }
}

/// Owned temporary changelog file, removed on drop
#[derive(Debug)]
pub struct TempChangeLog {
    path: PathBuf,
}

impl TempChangeLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the changelog written to this file and remove the file
    ///
    /// A file the engine never wrote reads as an empty changelog, which is
    /// what a diff without differences leaves behind.
    pub fn consume(self) -> Result<ChangeLog> {
        if !self.path.exists() {
            return Ok(ChangeLog::default());
        }
        ChangeLog::load(&self.path)
    }
}

impl Drop for TempChangeLog {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Removed temporary changelog"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove temporary changelog"),
        }
    }
}
