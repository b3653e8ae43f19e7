//! Error types for compound file operations
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CfbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a compound file")]
    NotCompoundFile,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Corrupted file: {0}")]
    Corrupted(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),
}

pub type Result<T> = std::result::Result<T, CfbError>;
