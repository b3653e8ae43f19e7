//! Unified error types for Embex.
//!
//! This module provides a unified error type that encompasses errors from the
//! compound-file reader, the package reader and the extraction engine itself.

// Submodule declarations
pub mod types;
pub mod conversions;

// Re-exports
pub use types::{Error, Result};
