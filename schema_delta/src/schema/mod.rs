//! Schema module for schema_delta
//!
//! This module compiles the model and classifies and orders its statements.

pub mod compiler;
pub mod ordering;
pub mod statement;

// Re-export key types
pub use compiler::{CommandCompiler, ModelCompiler, SqlFileCompiler};
pub use ordering::{order_statements, stable_topological_order, DependencyNode};
pub use statement::{classify, classify_all, ensure_unqualified, relation_names, DdlStatement, StatementKind};
