//! Constant values related to the Open Packaging Convention.
//!
//! Only the values the package reader and the embedding lookups need:
//! target modes, the relationship types that lead to embedded objects and
//! the content types of the parts behind them.

/// Open XML relationship target modes
pub mod target_mode {
    pub const EXTERNAL: &str = "External";
    pub const INTERNAL: &str = "Internal";
}

/// Relationship type URIs
pub mod relationship_type {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const OLE_OBJECT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/oleObject";
    pub const PACKAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/package";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

    // Strict (ISO 29500) namespace
    pub const STRICT_PACKAGE: &str =
        "http://purl.oclc.org/ooxml/officeDocument/relationships/package";
}

/// Content types of embedded parts
pub mod content_type {
    pub const OFC_OLE_OBJECT: &str = "application/vnd.openxmlformats-officedocument.oleObject";
    pub const OPC_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
    pub const WML_DOCUMENT: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    pub const WML_DOCUMENT_MAIN: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
    pub const SML_SHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
    pub const PNG: &str = "image/png";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}
