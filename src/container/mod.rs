//! Uniform node view over both container families.
//!
//! The extraction engine never looks at sectors or ZIP members directly. It
//! walks a [`Container`]: a tree (package: a graph) of [`ContainerNode`]s
//! that are either byte *streams* or *storages* holding further nodes.
//!
//! | Family   | Storage                    | Stream                 |
//! |----------|----------------------------|------------------------|
//! | Compound | storage / root entry       | stream entry           |
//! | Package  | part that has a `.rels`    | any other part         |
//!
//! Use [`open`] to sniff a reader and get the right implementation.

mod compound;
mod package;

pub use compound::CompoundContainer;
pub use package::PackageContainer;

use crate::cfb::is_compound_file;
use crate::common::error::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Container family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// OLE2 / MS-CFB compound file
    Compound,
    /// OPC / OOXML ZIP package
    Package,
}

/// Whether a node holds bytes or further nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Stream,
    Storage,
}

/// One node of a container.
///
/// Nodes are plain values; the container keeps owning the bytes behind them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNode {
    /// Container-specific handle (directory SID, member index)
    pub id: u64,
    /// Name within the parent
    pub name: String,
    /// Full `/`-separated path within the container, empty for the root
    pub path: String,
    pub kind: NodeKind,
    /// Size of a stream, when known up front
    pub byte_len: Option<u64>,
    /// Package only: content type of the part
    pub content_type: Option<String>,
    /// Package only: type of the relationship the node was reached through
    pub relationship: Option<String>,
    /// Compound only: CLSID of a storage; for a stream, of its enclosing
    /// storage
    pub class_id: Option<String>,
}

impl ContainerNode {
    #[inline]
    pub fn is_storage(&self) -> bool {
        self.kind == NodeKind::Storage
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Join `name` onto this node's path.
    pub(crate) fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}

/// Seekable output sink for [`Container::export`].
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// Read access to a compound file or package as a tree of nodes.
pub trait Container {
    fn format(&self) -> ContainerFormat;

    /// The root node.
    fn root(&self) -> ContainerNode;

    /// Children of a storage, in the container's native order.
    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>>;

    /// Outgoing relationships of a node as `(type, target)` pairs.
    ///
    /// Compound files have none.
    fn relationships(&self, _node: &ContainerNode) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Content type of a node, when the container records one.
    fn content_type(&self, node: &ContainerNode) -> Option<String> {
        node.content_type.clone()
    }

    /// Stream the bytes of a stream node.
    fn open_stream(&mut self, node: &ContainerNode) -> Result<Box<dyn Read + '_>>;

    /// Write the node, as a standalone object, into `out`. Returns the
    /// number of bytes written.
    ///
    /// Streams are copied verbatim; compound storages become a standalone
    /// compound file.
    fn export(&mut self, node: &ContainerNode, out: &mut dyn WriteSeek) -> Result<u64> {
        let mut reader = self.open_stream(node)?;
        Ok(io::copy(&mut reader, out)?)
    }

    /// Names directly below the root (compound entries, package members
    /// outside any folder).
    fn top_level_names(&self) -> Vec<String> {
        self.children(&self.root())
            .map(|children| children.into_iter().map(|c| c.name).collect())
            .unwrap_or_default()
    }
}

/// Identify a container family from the first bytes of a file.
pub fn sniff(prefix: &[u8]) -> Option<ContainerFormat> {
    if is_compound_file(prefix) {
        Some(ContainerFormat::Compound)
    } else if prefix.starts_with(b"PK\x03\x04") || prefix.starts_with(b"PK\x05\x06") {
        Some(ContainerFormat::Package)
    } else {
        None
    }
}

/// Open a reader as whichever container family its signature names.
///
/// Anything that is neither a compound file nor a ZIP package is
/// [`Error::NotOfficeFile`].
pub fn open<'a, R: Read + Seek + 'a>(mut reader: R) -> Result<Box<dyn Container + 'a>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut prefix = [0u8; 8];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    reader.seek(SeekFrom::Start(0))?;

    match sniff(&prefix[..filled]) {
        Some(ContainerFormat::Compound) => Ok(Box::new(CompoundContainer::open(reader)?)),
        Some(ContainerFormat::Package) => Ok(Box::new(PackageContainer::open(reader)?)),
        None => Err(Error::NotOfficeFile),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PackageBuilder, compound_of};
    use std::io::Cursor;

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(crate::cfb::consts::MAGIC), Some(ContainerFormat::Compound));
        assert_eq!(sniff(b"PK\x03\x04rest"), Some(ContainerFormat::Package));
        assert_eq!(sniff(b"PK\x05\x06"), Some(ContainerFormat::Package));
        assert_eq!(sniff(b"%PDF-1.7"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn test_open_dispatches_on_signature() {
        let compound = compound_of(&[("Contents", b"x".as_slice())]);
        let container = open(Cursor::new(compound)).unwrap();
        assert_eq!(container.format(), ContainerFormat::Compound);

        let package = PackageBuilder::docx().build();
        let container = open(Cursor::new(package)).unwrap();
        assert_eq!(container.format(), ContainerFormat::Package);
    }

    #[test]
    fn test_open_rejects_other_files() {
        assert!(matches!(
            open(Cursor::new(b"plain text".to_vec())),
            Err(Error::NotOfficeFile)
        ));
        assert!(matches!(open(Cursor::new(Vec::new())), Err(Error::NotOfficeFile)));

        // A ZIP that is not an OPC package
        let zip = crate::testing::zip_of(&[("a.txt", b"a".as_slice())]);
        assert!(matches!(open(Cursor::new(zip)), Err(Error::NotOfficeFile)));
    }

    #[test]
    fn test_child_path() {
        let root = ContainerNode {
            id: 0,
            name: String::new(),
            path: String::new(),
            kind: NodeKind::Storage,
            byte_len: None,
            content_type: None,
            relationship: None,
            class_id: None,
        };
        assert!(root.is_root());
        assert_eq!(root.child_path("ObjectPool"), "ObjectPool");

        let pool = ContainerNode {
            path: "ObjectPool".to_string(),
            name: "ObjectPool".to_string(),
            ..root
        };
        assert_eq!(pool.child_path("_1234"), "ObjectPool/_1234");
    }
}
