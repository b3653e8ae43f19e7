//! Embex - embedded object extraction for Microsoft Office files
//!
//! This library walks Microsoft Office containers and copies out the objects
//! embedded in them: OLE objects, packaged attachments, images and whole
//! nested documents (a workbook inside a document inside a presentation).
//!
//! Both container families are supported:
//!
//! - **Compound files** (OLE2 / MS-CFB): `.doc`, `.xls`, `.ppt` and raw OLE
//!   object blobs
//! - **Packages** (OPC / OOXML): `.docx`, `.xlsx`, `.pptx`, `.vsdx`
//!
//! # Features
//!
//! - **Uniform traversal**: both formats are exposed through the
//!   [`container::Container`] trait
//! - **Bounded memory**: payloads are streamed through temp-file backed
//!   [`SpillBuffer`]s, never loaded whole
//! - **Tolerant**: a corrupt embedding is recorded in the report and the
//!   traversal moves on
//! - **Hooks**: inspect, veto or react to every extraction through
//!   [`ExtractionHooks`]
//!
//! # Example - Extracting from a file
//!
//! ```no_run
//! use embex::{ExtractOptions, Extractor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = Extractor::new(ExtractOptions::default())?;
//! let report = extractor.extract_file("report.docx", "out/")?;
//!
//! for output in report.outputs() {
//!     println!("extracted {}", output.display());
//! }
//! for failure in report.failures() {
//!     eprintln!("{}: {}", failure.label, failure.error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Vetoing objects with a hook
//!
//! ```no_run
//! use embex::{BeforeExtract, ExtractOptions, Extractor, ExtractionHooks, HookResult, LogicalType};
//!
//! struct SkipImages;
//!
//! impl ExtractionHooks for SkipImages {
//!     fn before_extract(&self, event: &mut BeforeExtract<'_>) -> HookResult {
//!         event.cancel = matches!(event.classification.logical_type, LogicalType::Image(_));
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = Extractor::new(ExtractOptions::new().with_images(true))?.with_hooks(SkipImages);
//! let report = extractor.extract_file("deck.pptx", "out/")?;
//! println!("{} objects", report.outputs().len());
//! # Ok(())
//! # }
//! ```

/// Compound File Binary (OLE2) reader and minimal writer
///
/// Reads the sector/FAT structure of legacy Office files and exposes their
/// storages and streams. The writer is used to export an embedded storage
/// as a standalone compound file.
pub mod cfb;

/// Open Packaging Conventions reader
///
/// ZIP member access, content types and relationships of OOXML packages.
pub mod opc;

/// Shared infrastructure: unified errors and the spill buffer
pub mod common;

/// Uniform node view over both container families
pub mod container;

/// Embedded object classification
pub mod classify;

/// Extraction engine, hooks, options and reports
pub mod extract;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{
    Classifier, DocFamily, DocFormat, DocKind, ImageFormat, LogicalType, ObjectClassification,
};
pub use common::buffer::SpillBuffer;
pub use common::error::{Error, Result};
pub use container::{Container, ContainerFormat, ContainerNode, NodeKind};
pub use extract::{
    AfterExtract, BeforeExtract, ExtractFailure, ExtractOptions, ExtractionHooks,
    ExtractionReport, Extractor, HookError, HookResult, NoHooks, NodeFailure, ProtectionKind,
};
