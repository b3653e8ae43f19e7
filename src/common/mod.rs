//! Common types and utilities shared by both container families.
//!
//! This module provides the unified error type and the temp-file backed
//! byte buffer used to move embedded payloads around without holding them
//! in memory.

// Submodule declarations
pub mod buffer;
pub mod error;

// Re-exports for convenience
pub use buffer::SpillBuffer;
pub use error::{Error, Result};
