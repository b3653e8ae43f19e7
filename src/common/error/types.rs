//! Unified error types for Embex.
//!
//! Only [`Error::Protected`] and failures to open the top-level input escape
//! an extraction call. Every other variant ends up as a
//! [`NodeFailure`](crate::extract::NodeFailure) in the report.
use thiserror::Error;

use crate::cfb::CfbError;
use crate::extract::ProtectionKind;
use crate::opc::OpcError;

/// Main error type for Embex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input is neither a compound file nor a ZIP package
    #[error("Not a valid Office file")]
    NotOfficeFile,

    /// Compound file could not be read
    #[error("Compound file error: {0}")]
    Cfb(CfbError),

    /// OOXML package could not be read
    #[error("Package error: {0}")]
    Opc(OpcError),

    /// Container is encrypted or password protected
    #[error("File is password protected ({kind})")]
    Protected { kind: ProtectionKind },

    /// Streaming an embedded object's bytes failed
    #[error("Failed to copy '{node}': {source}")]
    CopyFailure {
        node: String,
        #[source]
        source: std::io::Error,
    },

    /// No known signature matched; the object was extracted as unknown
    #[error("No known signature for '{node}'")]
    ClassificationAmbiguous { node: String },

    /// Nested document lies deeper than the configured maximum
    #[error("Nesting depth {depth} exceeds the maximum of {max}")]
    DepthLimitExceeded { depth: usize, max: usize },

    /// A caller-supplied hook returned an error
    #[error("Hook failed: {0}")]
    Hook(String),

    /// Extraction options are inconsistent
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Whether this error reports a password-protected container.
    #[inline]
    pub fn is_protected(&self) -> bool {
        matches!(self, Error::Protected { .. })
    }
}

/// Result type for Embex operations.
pub type Result<T> = std::result::Result<T, Error>;
