//! Embedded object classification.
//!
//! Decides, from a node's metadata and at most [`SIGNATURE_PEEK_LEN`] bytes
//! of its content, whether the node is an embedded object, what it is, and
//! which file extension its output gets. Classification is pure: no I/O, no
//! logging, same input same answer.
//!
//! # Rules
//!
//! **Packages**: a part is an embedded object when it was reached through an
//! `oleObject` or `package` relationship (or `image`, when images are
//! requested). Its content type tells what it is; parts typed
//! `application/octet-stream` or untyped are identified by signature.
//!
//! **Compound files**:
//! - `\x01Ole10Native` streams are native (OLE 1.0 packaged) objects
//! - `Package` streams hold an OOXML document; its family comes from the
//!   class of the enclosing storage
//! - `CONTENTS` streams (and any configured extra names) are identified by
//!   signature
//! - object storages (`_<digits>` in Word, `MBD<8 hex>` in Excel) whose class
//!   is a compound document class are nested documents; with any other class
//!   they are plain wrappers and only their streams are looked at

pub mod tables;

pub use tables::SIGNATURE_PEEK_LEN;

use crate::container::{ContainerFormat, ContainerNode, NodeKind};
use crate::extract::ExtractOptions;
use std::collections::HashSet;
use tables::{
    COMPOUND_DOCUMENT_CLASSES, COMPOUND_STREAMS, CONTENT_TYPES, EMBEDDING_ROLES, IMAGE_ROLES,
    IMAGE_SUBTYPES, OFFICE_CONTENT_TYPE_PREFIX, OPAQUE_CONTENT_TYPES, PACKAGE_WRAPPER_CLASSES,
    SIGNATURES, Signature, StreamRule,
};

/// Office application family of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocFamily {
    Word,
    Excel,
    PowerPoint,
    Visio,
    Unknown,
}

/// Container family of a nested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocFormat {
    /// Legacy binary (compound file)
    Compound,
    /// OOXML package
    Package,
}

/// What kind of document a nested document is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocKind {
    pub family: DocFamily,
    pub format: DocFormat,
    /// Macro-enabled variant (`docm`, `xlsm`, ...)
    pub macros: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Emf,
    Wmf,
    Svg,
    Other,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tif",
            ImageFormat::Emf => "emf",
            ImageFormat::Wmf => "wmf",
            ImageFormat::Svg => "svg",
            ImageFormat::Other => "img",
        }
    }
}

/// What an embedded object is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// A complete Office document; extracted and then searched itself
    NestedDocument(DocKind),
    /// An OLE object or packaged file that is not an Office document
    NativeObject,
    Image(ImageFormat),
    Unknown,
}

/// Result of classifying one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectClassification {
    /// Whether the node is copied out
    pub extractable: bool,
    pub logical_type: LogicalType,
    /// File extension of the output, without the dot
    pub extension: &'static str,
    /// The node was expected to carry a known signature but none matched
    pub ambiguous: bool,
}

impl ObjectClassification {
    /// A node that is not an embedded object.
    pub fn skip() -> Self {
        Self {
            extractable: false,
            logical_type: LogicalType::Unknown,
            extension: extension_for(LogicalType::Unknown),
            ambiguous: false,
        }
    }

    fn object(logical_type: LogicalType) -> Self {
        Self {
            extractable: true,
            logical_type,
            extension: extension_for(logical_type),
            ambiguous: false,
        }
    }

    fn ambiguous() -> Self {
        Self {
            ambiguous: true,
            ..Self::object(LogicalType::Unknown)
        }
    }

    /// Whether the object is a document that is searched for further objects.
    #[inline]
    pub fn is_nested_document(&self) -> bool {
        matches!(self.logical_type, LogicalType::NestedDocument(_))
    }
}

/// Output file extension for a logical type.
pub fn extension_for(logical_type: LogicalType) -> &'static str {
    use DocFamily::*;
    use DocFormat::*;

    match logical_type {
        LogicalType::NestedDocument(DocKind {
            family,
            format,
            macros,
        }) => match (family, format, macros) {
            (Word, Package, false) => "docx",
            (Word, Package, true) => "docm",
            (Word, Compound, _) => "doc",
            (Excel, Package, false) => "xlsx",
            (Excel, Package, true) => "xlsm",
            (Excel, Compound, _) => "xls",
            (PowerPoint, Package, false) => "pptx",
            (PowerPoint, Package, true) => "pptm",
            (PowerPoint, Compound, _) => "ppt",
            (Visio, Package, false) => "vsdx",
            (Visio, Package, true) => "vsdm",
            (Visio, Compound, _) => "vsd",
            (Unknown, Package, _) => "zip",
            (Unknown, Compound, _) => "bin",
        },
        LogicalType::Image(format) => format.extension(),
        LogicalType::NativeObject | LogicalType::Unknown => "bin",
    }
}

/// Match a content prefix against the signature table.
pub fn sniff_signature(prefix: &[u8]) -> Option<Signature> {
    SIGNATURES
        .iter()
        .find(|(offset, magic, _)| {
            prefix
                .get(*offset..*offset + magic.len())
                .is_some_and(|window| window == *magic)
        })
        .map(|(_, _, kind)| *kind)
}

fn logical_type_of(signature: Signature, family: DocFamily) -> LogicalType {
    match signature {
        Signature::Compound => LogicalType::NestedDocument(DocKind {
            family,
            format: DocFormat::Compound,
            macros: false,
        }),
        Signature::Zip => LogicalType::NestedDocument(DocKind {
            family,
            format: DocFormat::Package,
            macros: false,
        }),
        Signature::Image(format) => LogicalType::Image(format),
    }
}

/// Whether a storage name follows an embedded-object naming scheme:
/// `_<digits>` (Word ObjectPool) or `MBD<8 hex digits>` (Excel).
pub fn is_object_storage_name(name: &str) -> bool {
    if let Some(digits) = name.strip_prefix('_') {
        return !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    }
    match name.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("MBD") => {
            let hex = &name[3..];
            hex.len() == 8 && hex.bytes().all(|b| b.is_ascii_hexdigit())
        },
        _ => false,
    }
}

/// Lowercased content type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Classifies container nodes.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    include_images: bool,
    /// Lowercased additional compound stream names identified by signature
    extra_streams: HashSet<String>,
}

impl Classifier {
    pub fn new(options: &ExtractOptions) -> Self {
        Self {
            include_images: options.include_images,
            extra_streams: options
                .extra_stream_names
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
        }
    }

    /// Whether [`classify`](Self::classify) needs the first
    /// [`SIGNATURE_PEEK_LEN`] bytes of the node.
    pub fn wants_signature(&self, format: ContainerFormat, node: &ContainerNode) -> bool {
        if node.kind != NodeKind::Stream {
            return false;
        }
        match format {
            ContainerFormat::Compound => matches!(
                self.stream_rule(&node.name),
                Some(StreamRule::Package | StreamRule::Sniff)
            ),
            ContainerFormat::Package => {
                self.is_embedding_role(node)
                    && node
                        .content_type
                        .as_deref()
                        .is_none_or(|ct| OPAQUE_CONTENT_TYPES.contains(media_type(ct).as_str()))
            },
        }
    }

    /// Classify a node. `prefix` holds the first bytes of a stream when
    /// [`wants_signature`](Self::wants_signature) asked for them.
    pub fn classify(
        &self,
        format: ContainerFormat,
        node: &ContainerNode,
        prefix: Option<&[u8]>,
    ) -> ObjectClassification {
        match format {
            ContainerFormat::Compound => self.classify_compound(node, prefix.unwrap_or_default()),
            ContainerFormat::Package => self.classify_part(node, prefix.unwrap_or_default()),
        }
    }

    fn is_embedding_role(&self, node: &ContainerNode) -> bool {
        let Some(role) = node.relationship.as_deref() else {
            return false;
        };
        let role = role.to_ascii_lowercase();
        EMBEDDING_ROLES.contains(role.as_str())
            || (self.include_images && IMAGE_ROLES.contains(role.as_str()))
    }

    fn classify_part(&self, node: &ContainerNode, prefix: &[u8]) -> ObjectClassification {
        if !self.is_embedding_role(node) {
            return ObjectClassification::skip();
        }

        let content_type = node.content_type.as_deref().map(media_type);
        let logical_type = match content_type.as_deref() {
            None => None,
            Some(ct) if OPAQUE_CONTENT_TYPES.contains(ct) => None,
            Some(ct) => Some(if let Some(known) = CONTENT_TYPES.get(ct) {
                *known
            } else if let Some(subtype) = ct.strip_prefix("image/") {
                LogicalType::Image(
                    IMAGE_SUBTYPES
                        .get(subtype)
                        .copied()
                        .unwrap_or(ImageFormat::Other),
                )
            } else if ct.starts_with(OFFICE_CONTENT_TYPE_PREFIX) {
                LogicalType::NativeObject
            } else {
                LogicalType::Unknown
            }),
        };

        match logical_type {
            Some(logical_type) => ObjectClassification::object(logical_type),
            None => match sniff_signature(prefix) {
                Some(signature) => {
                    ObjectClassification::object(logical_type_of(signature, DocFamily::Unknown))
                },
                None => ObjectClassification::ambiguous(),
            },
        }
    }

    fn stream_rule(&self, name: &str) -> Option<StreamRule> {
        let name = name.to_lowercase();
        COMPOUND_STREAMS.get(name.as_str()).copied().or_else(|| {
            self.extra_streams
                .contains(&name)
                .then_some(StreamRule::Sniff)
        })
    }

    fn classify_compound(&self, node: &ContainerNode, prefix: &[u8]) -> ObjectClassification {
        let class = node.class_id.as_deref().map(str::to_ascii_lowercase);

        if node.kind == NodeKind::Storage {
            if !is_object_storage_name(&node.name) {
                return ObjectClassification::skip();
            }
            return match class
                .as_deref()
                .and_then(|c| COMPOUND_DOCUMENT_CLASSES.get(c))
            {
                Some(&family) => ObjectClassification::object(LogicalType::NestedDocument(DocKind {
                    family,
                    format: DocFormat::Compound,
                    macros: false,
                })),
                None => ObjectClassification::skip(),
            };
        }

        let Some(rule) = self.stream_rule(&node.name) else {
            return ObjectClassification::skip();
        };

        match rule {
            StreamRule::NativeObject => ObjectClassification::object(LogicalType::NativeObject),
            StreamRule::Package => match sniff_signature(prefix) {
                Some(Signature::Zip) => {
                    let family = class
                        .as_deref()
                        .and_then(|c| PACKAGE_WRAPPER_CLASSES.get(c))
                        .copied()
                        .unwrap_or(DocFamily::Unknown);
                    ObjectClassification::object(logical_type_of(Signature::Zip, family))
                },
                _ => ObjectClassification::ambiguous(),
            },
            StreamRule::Sniff => match sniff_signature(prefix) {
                Some(signature) => {
                    ObjectClassification::object(logical_type_of(signature, DocFamily::Unknown))
                },
                None => ObjectClassification::ambiguous(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::{content_type, relationship_type};
    use proptest::prelude::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const ZIP: &[u8] = b"PK\x03\x04\x14\0\0\0";

    fn part(relationship: &str, content_type: Option<&str>) -> ContainerNode {
        ContainerNode {
            id: 1,
            name: "object.bin".to_string(),
            path: "word/embeddings/object.bin".to_string(),
            kind: NodeKind::Stream,
            byte_len: Some(10),
            content_type: content_type.map(str::to_string),
            relationship: Some(relationship.to_string()),
            class_id: None,
        }
    }

    fn entry(name: &str, kind: NodeKind, class_id: Option<&str>) -> ContainerNode {
        ContainerNode {
            id: 3,
            name: name.to_string(),
            path: format!("ObjectPool/{name}"),
            kind,
            byte_len: (kind == NodeKind::Stream).then_some(100),
            content_type: None,
            relationship: None,
            class_id: class_id.map(str::to_string),
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(&ExtractOptions::default())
    }

    #[test]
    fn test_package_embeddings_by_content_type() {
        let c = classifier();

        let docx = part(relationship_type::PACKAGE, Some(content_type::WML_DOCUMENT));
        let result = c.classify(ContainerFormat::Package, &docx, None);
        assert!(result.extractable);
        assert!(result.is_nested_document());
        assert_eq!(result.extension, "docx");

        let ole = part(relationship_type::OLE_OBJECT, Some(content_type::OFC_OLE_OBJECT));
        let result = c.classify(ContainerFormat::Package, &ole, None);
        assert_eq!(result.logical_type, LogicalType::NativeObject);
        assert_eq!(result.extension, "bin");

        let xlsm = part(
            relationship_type::STRICT_PACKAGE,
            Some("application/vnd.ms-excel.sheet.macroEnabled.12"),
        );
        assert_eq!(c.classify(ContainerFormat::Package, &xlsm, None).extension, "xlsm");
    }

    #[test]
    fn test_package_signature_fallback() {
        let c = classifier();
        let untyped = part(relationship_type::OLE_OBJECT, Some(content_type::OCTET_STREAM));
        assert!(c.wants_signature(ContainerFormat::Package, &untyped));

        let result = c.classify(ContainerFormat::Package, &untyped, Some(crate::cfb::consts::MAGIC.as_slice()));
        assert_eq!(result.extension, "bin");
        assert!(result.is_nested_document());
        assert!(!result.ambiguous);

        let result = c.classify(ContainerFormat::Package, &untyped, Some(ZIP));
        assert_eq!(result.extension, "zip");

        let result = c.classify(ContainerFormat::Package, &untyped, Some(b"plain text".as_slice()));
        assert!(result.extractable);
        assert!(result.ambiguous);
        assert_eq!(result.logical_type, LogicalType::Unknown);
    }

    #[test]
    fn test_images_only_when_requested() {
        let image = part(relationship_type::IMAGE, Some(content_type::PNG));
        assert!(!classifier().classify(ContainerFormat::Package, &image, None).extractable);

        let c = Classifier::new(&ExtractOptions::default().with_images(true));
        let result = c.classify(ContainerFormat::Package, &image, None);
        assert!(result.extractable);
        assert_eq!(result.logical_type, LogicalType::Image(ImageFormat::Png));
        assert_eq!(result.extension, "png");

        let emf = part(relationship_type::IMAGE, Some("image/x-emf"));
        assert_eq!(c.classify(ContainerFormat::Package, &emf, None).extension, "emf");
    }

    #[test]
    fn test_other_relationships_are_skipped() {
        let styles = part(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
            Some(content_type::XML),
        );
        let c = classifier();
        assert!(!c.classify(ContainerFormat::Package, &styles, None).extractable);
        assert!(!c.wants_signature(ContainerFormat::Package, &styles));
    }

    #[test]
    fn test_compound_streams() {
        let c = classifier();
        let native = entry("\u{1}Ole10Native", NodeKind::Stream, None);
        assert!(!c.wants_signature(ContainerFormat::Compound, &native));
        let result = c.classify(ContainerFormat::Compound, &native, None);
        assert_eq!(result.logical_type, LogicalType::NativeObject);

        let contents = entry("CONTENTS", NodeKind::Stream, None);
        assert!(c.wants_signature(ContainerFormat::Compound, &contents));
        let result = c.classify(ContainerFormat::Compound, &contents, Some(PNG));
        assert_eq!(result.logical_type, LogicalType::Image(ImageFormat::Png));

        let other = entry("WordDocument", NodeKind::Stream, None);
        assert!(!c.classify(ContainerFormat::Compound, &other, None).extractable);
    }

    #[test]
    fn test_package_stream_family_from_class() {
        let c = classifier();
        let package = entry(
            "Package",
            NodeKind::Stream,
            Some("F4754C9B-64F5-4B40-8AF4-679732AC0607"),
        );
        assert!(c.wants_signature(ContainerFormat::Compound, &package));
        let result = c.classify(ContainerFormat::Compound, &package, Some(ZIP));
        assert_eq!(result.extension, "docx");

        let unknown = entry("Package", NodeKind::Stream, None);
        assert_eq!(c.classify(ContainerFormat::Compound, &unknown, Some(ZIP)).extension, "zip");

        let garbage = c.classify(ContainerFormat::Compound, &unknown, Some(b"nope".as_slice()));
        assert!(garbage.ambiguous);
    }

    #[test]
    fn test_object_storages() {
        let c = classifier();
        let workbook = entry("_1234", NodeKind::Storage, Some("00020820-0000-0000-C000-000000000046"));
        let result = c.classify(ContainerFormat::Compound, &workbook, None);
        assert!(result.extractable);
        assert_eq!(result.extension, "xls");

        let mbd = entry("MBD0012ABCD", NodeKind::Storage, Some("00020906-0000-0000-C000-000000000046"));
        assert_eq!(c.classify(ContainerFormat::Compound, &mbd, None).extension, "doc");

        // Wrapper storage of a packaged file: transparent
        let wrapper = entry("_1234", NodeKind::Storage, Some("0003000C-0000-0000-C000-000000000046"));
        assert!(!c.classify(ContainerFormat::Compound, &wrapper, None).extractable);

        let pool = entry("ObjectPool", NodeKind::Storage, Some("00020906-0000-0000-C000-000000000046"));
        assert!(!c.classify(ContainerFormat::Compound, &pool, None).extractable);
    }

    #[test]
    fn test_extra_stream_names() {
        let c = Classifier::new(&ExtractOptions::default().with_extra_stream_name("EmbeddedData"));
        let node = entry("embeddeddata", NodeKind::Stream, None);
        assert!(c.wants_signature(ContainerFormat::Compound, &node));
        let result = c.classify(ContainerFormat::Compound, &node, Some(PNG));
        assert_eq!(result.extension, "png");
    }

    #[test]
    fn test_object_storage_names() {
        assert!(is_object_storage_name("_1234567890"));
        assert!(is_object_storage_name("MBD00A1B2C3"));
        assert!(is_object_storage_name("mbd00a1b2c3"));
        assert!(!is_object_storage_name("_"));
        assert!(!is_object_storage_name("_12a"));
        assert!(!is_object_storage_name("MBD123"));
        assert!(!is_object_storage_name("ObjectPool"));
    }

    #[test]
    fn test_emf_signature_at_offset() {
        let mut emf = vec![0u8; 64];
        emf[0] = 1;
        emf[40..44].copy_from_slice(b" EMF");
        assert_eq!(sniff_signature(&emf), Some(Signature::Image(ImageFormat::Emf)));
        assert_eq!(sniff_signature(&emf[..20]), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_classification_is_deterministic(
            prefix in proptest::collection::vec(any::<u8>(), 0..SIGNATURE_PEEK_LEN),
            name in "[A-Za-z_0-9\u{1}]{1,31}",
            storage in any::<bool>(),
        ) {
            let c = classifier();
            let kind = if storage { NodeKind::Storage } else { NodeKind::Stream };
            let node = entry(&name, kind, Some("00020906-0000-0000-C000-000000000046"));

            let first = c.classify(ContainerFormat::Compound, &node, Some(prefix.as_slice()));
            let second = c.classify(ContainerFormat::Compound, &node, Some(prefix.as_slice()));
            prop_assert_eq!(first, second);
            prop_assert!(!first.extension.is_empty());
            prop_assert!(first.extension.bytes().all(|b| b.is_ascii_alphanumeric()));
        }

        #[test]
        fn prop_unrelated_roles_are_never_extracted(
            role in "http://example\\.com/[a-z]{1,12}",
            prefix in proptest::collection::vec(any::<u8>(), 0..SIGNATURE_PEEK_LEN),
        ) {
            let c = Classifier::new(&ExtractOptions::default().with_images(true));
            let node = part(&role, None);
            let result = c.classify(ContainerFormat::Package, &node, Some(prefix.as_slice()));
            prop_assert!(!result.extractable);
        }

        #[test]
        fn prop_ambiguous_implies_unknown(
            prefix in proptest::collection::vec(any::<u8>(), 0..SIGNATURE_PEEK_LEN),
        ) {
            let c = classifier();
            let node = part(relationship_type::OLE_OBJECT, None);
            let result = c.classify(ContainerFormat::Package, &node, Some(prefix.as_slice()));
            prop_assert!(result.extractable);
            if result.ambiguous {
                prop_assert_eq!(result.logical_type, LogicalType::Unknown);
            }
        }
    }
}
