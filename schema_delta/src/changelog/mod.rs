//! Changelog module for schema_delta
//!
//! In-memory changelogs, their persistence, post-processing and the scoped
//! temporary files they travel through between stages.

pub mod processor;
pub mod scratch;
pub mod store;
pub mod types;

// Re-export key types
pub use processor::{process, ProcessingPolicy, UndeployList};
pub use scratch::{ScratchDir, TempChangeLog};
pub use types::{Change, ChangeKind, ChangeLog, ChangeSet, Target};
