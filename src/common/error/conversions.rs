//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from the
//! format-specific error types to the unified Error type.

use super::types::Error;
use crate::cfb::CfbError;
use crate::opc::OpcError;

impl From<CfbError> for Error {
    fn from(err: CfbError) -> Self {
        match err {
            CfbError::Io(e) => Error::Io(e),
            CfbError::NotCompoundFile => Error::NotOfficeFile,
            other => Error::Cfb(other),
        }
    }
}

impl From<OpcError> for Error {
    fn from(err: OpcError) -> Self {
        match err {
            OpcError::IoError(e) => Error::Io(e),
            OpcError::NotAPackage => Error::NotOfficeFile,
            other => Error::Opc(other),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::from(OpcError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_unwrapped() {
        let err: Error = CfbError::Io(std::io::Error::other("boom")).into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = OpcError::IoError(std::io::Error::other("boom")).into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_signature_errors_map_to_not_office_file() {
        let err: Error = CfbError::NotCompoundFile.into();
        assert!(matches!(err, Error::NotOfficeFile));

        let err: Error = OpcError::NotAPackage.into();
        assert!(matches!(err, Error::NotOfficeFile));
    }

    #[test]
    fn test_format_errors_keep_their_source() {
        let err: Error = CfbError::Corrupted("cyclic chain".to_string()).into();
        assert!(matches!(err, Error::Cfb(CfbError::Corrupted(_))));
        assert!(err.to_string().contains("cyclic chain"));
    }
}
