use super::{Container, ContainerFormat, ContainerNode, NodeKind};
use crate::common::error::Result;
use crate::opc::{Package, PackURI};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::debug;

/// [`Container`] over an OPC package.
///
/// The package's relationship graph is exposed as a tree: the children of a
/// part are the internal targets of its relationships. A part that has its
/// own relationships is a storage, any other part a stream. The graph may
/// revisit parts; callers keep their own visited set.
///
/// Node IDs are member indexes plus one; the root (the package itself) is 0.
pub struct PackageContainer<R: Read + Seek> {
    package: Package<R>,
    ids: HashMap<String, u64>,
}

impl<R: Read + Seek> PackageContainer<R> {
    pub fn open(reader: R) -> Result<Self> {
        let package = Package::open(reader)?;
        let ids = package
            .member_names()
            .enumerate()
            .map(|(i, name)| {
                let partname = PackURI::from_membername(name);
                (partname.as_str().to_lowercase(), i as u64 + 1)
            })
            .collect();
        Ok(Self { package, ids })
    }

    fn partname(node: &ContainerNode) -> PackURI {
        if node.is_root() {
            PackURI::package()
        } else {
            PackURI::from_membername(&node.path)
        }
    }
}

impl<R: Read + Seek> Container for PackageContainer<R> {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Package
    }

    fn root(&self) -> ContainerNode {
        ContainerNode {
            id: 0,
            name: String::new(),
            path: String::new(),
            kind: NodeKind::Storage,
            byte_len: None,
            content_type: None,
            relationship: None,
            class_id: None,
        }
    }

    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>> {
        let source = Self::partname(node);
        let mut children = Vec::new();

        for rel in self.package.relationships(&source) {
            if rel.is_external() {
                continue;
            }
            let target = match rel.target_partname() {
                Ok(target) => target,
                Err(e) => {
                    debug!(source = %source, target = %rel.target_ref, error = %e, "skipping unresolvable relationship");
                    continue;
                },
            };

            let storage = self.package.has_rels(&target);
            children.push(ContainerNode {
                id: self
                    .ids
                    .get(&target.as_str().to_lowercase())
                    .copied()
                    .unwrap_or(u64::MAX),
                name: target.filename().to_string(),
                path: target.membername().to_string(),
                kind: if storage {
                    NodeKind::Storage
                } else {
                    NodeKind::Stream
                },
                byte_len: self.package.part_size(&target),
                content_type: self.package.content_type(&target).map(str::to_string),
                relationship: Some(rel.reltype.clone()),
                class_id: None,
            });
        }

        Ok(children)
    }

    fn relationships(&self, node: &ContainerNode) -> Vec<(String, String)> {
        self.package
            .relationships(&Self::partname(node))
            .iter()
            .map(|rel| (rel.reltype.clone(), rel.target_ref.clone()))
            .collect()
    }

    fn content_type(&self, node: &ContainerNode) -> Option<String> {
        self.package
            .content_type(&Self::partname(node))
            .map(str::to_string)
    }

    fn open_stream(&mut self, node: &ContainerNode) -> Result<Box<dyn Read + '_>> {
        let partname = Self::partname(node);
        Ok(self.package.open_part(&partname)?)
    }

    fn top_level_names(&self) -> Vec<String> {
        self.package
            .member_names()
            .filter(|name| !name.contains('/'))
            .map(str::to_string)
            .collect()
    }
}
