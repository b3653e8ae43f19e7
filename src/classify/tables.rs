//! Static lookup tables for object classification.
//!
//! All keys are lowercase; callers lowercase before lookup.

use super::{DocFamily, DocFormat, DocKind, ImageFormat, LogicalType};
use phf::{phf_map, phf_set};

/// How a well-known compound stream is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRule {
    /// `\x01Ole10Native`: a packaged file in an OLE 1.0 wrapper
    NativeObject,
    /// `Package`: an OOXML document embedded in an OLE wrapper
    Package,
    /// Type decided by the content signature
    Sniff,
}

/// Well-known embedded-object streams of compound files
pub static COMPOUND_STREAMS: phf::Map<&'static str, StreamRule> = phf_map! {
    "\u{1}ole10native" => StreamRule::NativeObject,
    "package" => StreamRule::Package,
    "contents" => StreamRule::Sniff,
};

const fn doc(family: DocFamily, format: DocFormat, macros: bool) -> LogicalType {
    LogicalType::NestedDocument(DocKind {
        family,
        format,
        macros,
    })
}

/// Classes of storages that hold a complete compound document
pub static COMPOUND_DOCUMENT_CLASSES: phf::Map<&'static str, DocFamily> = phf_map! {
    // Word.Document.8
    "00020906-0000-0000-c000-000000000046" => DocFamily::Word,
    // Word.Document.6
    "00020900-0000-0000-c000-000000000046" => DocFamily::Word,
    // Excel.Sheet.8
    "00020820-0000-0000-c000-000000000046" => DocFamily::Excel,
    // Excel.Sheet.5
    "00020810-0000-0000-c000-000000000046" => DocFamily::Excel,
    // Excel.Chart.8
    "00020821-0000-0000-c000-000000000046" => DocFamily::Excel,
    // PowerPoint.Show.8
    "64818d10-4f9b-11cf-86ea-00aa00b929e8" => DocFamily::PowerPoint,
    // PowerPoint.Slide.8
    "64818d11-4f9b-11cf-86ea-00aa00b929e8" => DocFamily::PowerPoint,
    // Visio.Drawing.11
    "00021a14-0000-0000-c000-000000000046" => DocFamily::Visio,
};

/// Classes of OLE wrappers around an OOXML package (`Package` stream)
pub static PACKAGE_WRAPPER_CLASSES: phf::Map<&'static str, DocFamily> = phf_map! {
    // Word.Document.12
    "f4754c9b-64f5-4b40-8af4-679732ac0607" => DocFamily::Word,
    // Excel.Sheet.12
    "00020830-0000-0000-c000-000000000046" => DocFamily::Excel,
    // Excel.SheetMacroEnabled.12
    "00020832-0000-0000-c000-000000000046" => DocFamily::Excel,
    // PowerPoint.Show.12
    "cf4f55f4-8f87-4d47-80bb-5808164bb3f8" => DocFamily::PowerPoint,
    // Visio.Drawing.15
    "00021a15-0000-0000-c000-000000000046" => DocFamily::Visio,
};

/// Content types of package parts
pub static CONTENT_TYPES: phf::Map<&'static str, LogicalType> = phf_map! {
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => doc(DocFamily::Word, DocFormat::Package, false),
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template" => doc(DocFamily::Word, DocFormat::Package, false),
    "application/vnd.ms-word.document.macroenabled.12" => doc(DocFamily::Word, DocFormat::Package, true),
    "application/vnd.ms-word.template.macroenabled.12" => doc(DocFamily::Word, DocFormat::Package, true),
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => doc(DocFamily::Excel, DocFormat::Package, false),
    "application/vnd.openxmlformats-officedocument.spreadsheetml.template" => doc(DocFamily::Excel, DocFormat::Package, false),
    "application/vnd.ms-excel.sheet.macroenabled.12" => doc(DocFamily::Excel, DocFormat::Package, true),
    "application/vnd.ms-excel.sheet.binary.macroenabled.12" => doc(DocFamily::Excel, DocFormat::Package, true),
    "application/vnd.openxmlformats-officedocument.presentationml.presentation" => doc(DocFamily::PowerPoint, DocFormat::Package, false),
    "application/vnd.openxmlformats-officedocument.presentationml.slideshow" => doc(DocFamily::PowerPoint, DocFormat::Package, false),
    "application/vnd.ms-powerpoint.presentation.macroenabled.12" => doc(DocFamily::PowerPoint, DocFormat::Package, true),
    "application/vnd.ms-visio.drawing" => doc(DocFamily::Visio, DocFormat::Package, false),
    "application/vnd.ms-visio.drawing.macroenabled.12" => doc(DocFamily::Visio, DocFormat::Package, true),
    "application/msword" => doc(DocFamily::Word, DocFormat::Compound, false),
    "application/vnd.ms-excel" => doc(DocFamily::Excel, DocFormat::Compound, false),
    "application/vnd.ms-powerpoint" => doc(DocFamily::PowerPoint, DocFormat::Compound, false),
    "application/vnd.visio" => doc(DocFamily::Visio, DocFormat::Compound, false),
    "application/vnd.openxmlformats-officedocument.oleobject" => LogicalType::NativeObject,
};

/// Prefix shared by the Office-specific content types not listed above
pub const OFFICE_CONTENT_TYPE_PREFIX: &str = "application/vnd.openxmlformats-officedocument.";

/// Content types that say nothing about the bytes
pub static OPAQUE_CONTENT_TYPES: phf::Set<&'static str> = phf_set! {
    "application/octet-stream",
    "application/binary",
};

/// `image/<subtype>` content types
pub static IMAGE_SUBTYPES: phf::Map<&'static str, ImageFormat> = phf_map! {
    "png" => ImageFormat::Png,
    "jpeg" => ImageFormat::Jpeg,
    "jpg" => ImageFormat::Jpeg,
    "pjpeg" => ImageFormat::Jpeg,
    "gif" => ImageFormat::Gif,
    "bmp" => ImageFormat::Bmp,
    "x-bmp" => ImageFormat::Bmp,
    "tiff" => ImageFormat::Tiff,
    "x-emf" => ImageFormat::Emf,
    "emf" => ImageFormat::Emf,
    "x-wmf" => ImageFormat::Wmf,
    "wmf" => ImageFormat::Wmf,
    "svg+xml" => ImageFormat::Svg,
};

/// Relationship types that point at embedded objects
pub static EMBEDDING_ROLES: phf::Set<&'static str> = phf_set! {
    "http://schemas.openxmlformats.org/officedocument/2006/relationships/oleobject",
    "http://schemas.openxmlformats.org/officedocument/2006/relationships/package",
    "http://purl.oclc.org/ooxml/officedocument/relationships/oleobject",
    "http://purl.oclc.org/ooxml/officedocument/relationships/package",
};

/// Relationship types that point at images
pub static IMAGE_ROLES: phf::Set<&'static str> = phf_set! {
    "http://schemas.openxmlformats.org/officedocument/2006/relationships/image",
    "http://purl.oclc.org/ooxml/officedocument/relationships/image",
};

/// What a content signature identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Compound,
    Zip,
    Image(ImageFormat),
}

/// Content signatures as `(offset, magic, kind)`
pub static SIGNATURES: &[(usize, &[u8], Signature)] = &[
    (0, b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1", Signature::Compound),
    (0, b"PK\x03\x04", Signature::Zip),
    (0, b"\x89PNG\r\n\x1a\n", Signature::Image(ImageFormat::Png)),
    (0, b"\xFF\xD8\xFF", Signature::Image(ImageFormat::Jpeg)),
    (0, b"GIF87a", Signature::Image(ImageFormat::Gif)),
    (0, b"GIF89a", Signature::Image(ImageFormat::Gif)),
    (0, b"II*\x00", Signature::Image(ImageFormat::Tiff)),
    (0, b"MM\x00*", Signature::Image(ImageFormat::Tiff)),
    (0, b"\xD7\xCD\xC6\x9A", Signature::Image(ImageFormat::Wmf)),
    (40, b" EMF", Signature::Image(ImageFormat::Emf)),
    (0, b"BM", Signature::Image(ImageFormat::Bmp)),
];

/// Bytes a classifier needs to see to apply every signature
pub const SIGNATURE_PEEK_LEN: usize = 64;
