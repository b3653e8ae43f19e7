/// Open Packaging Conventions (OPC) reader.
///
/// Read-only access to the pieces of an OOXML package that matter when
/// hunting for embedded objects:
///
/// - ZIP members, streamed without loading them whole
/// - Content types from `[Content_Types].xml` (Default and Override)
/// - Relationships from every `_rels/*.rels` part
/// - PackURI arithmetic to resolve relationship targets
pub mod constants;
pub mod error;
pub mod package;
pub mod packuri;

pub use error::{OpcError, Result};
pub use package::{Package, Relationship};
pub use packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
