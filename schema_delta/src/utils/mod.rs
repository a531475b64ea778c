//! Utilities for schema_delta
//!
//! This module provides utility functions used across the library.

pub mod logging;

pub use logging::init_logging;
