use super::{Container, ContainerFormat, ContainerNode, NodeKind, WriteSeek};
use crate::cfb::{CfbError, CompoundFile, CompoundWriter, Entry};
use crate::common::error::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Seek};

/// [`Container`] over a compound file.
///
/// Node IDs are directory SIDs.
pub struct CompoundContainer<R> {
    file: CompoundFile<R>,
}

impl<R: Read + Seek> CompoundContainer<R> {
    pub fn open(reader: R) -> Result<Self> {
        Ok(Self {
            file: CompoundFile::open(reader)?,
        })
    }

    fn node(entry: &Entry, parent: &ContainerNode) -> ContainerNode {
        let storage = entry.kind.is_storage();
        ContainerNode {
            id: entry.sid as u64,
            name: entry.name.clone(),
            path: parent.child_path(&entry.name),
            kind: if storage {
                NodeKind::Storage
            } else {
                NodeKind::Stream
            },
            byte_len: (!storage).then_some(entry.size),
            content_type: None,
            relationship: None,
            class_id: if storage {
                entry.clsid.clone()
            } else {
                parent.class_id.clone()
            },
        }
    }

    /// Write a storage and its whole subtree as a standalone compound file.
    fn export_storage(&mut self, node: &ContainerNode, out: &mut dyn WriteSeek) -> Result<u64> {
        let top = self
            .file
            .entry(node.id as u32)
            .ok_or_else(|| CfbError::EntryNotFound(node.path.clone()))?;

        let mut writer = CompoundWriter::new();
        writer.set_root_clsid(top.clsid_bytes);

        // Breadth-first so parents are always added before their children
        let mut streams: HashMap<Vec<String>, u32> = HashMap::new();
        let mut visited = HashSet::from([top.sid]);
        let mut queue = VecDeque::from([(top.sid, Vec::<String>::new())]);
        while let Some((sid, path)) = queue.pop_front() {
            for child in self.file.children(sid) {
                if !visited.insert(child.sid) {
                    continue;
                }
                let mut child_path = path.clone();
                child_path.push(child.name.clone());

                if child.kind.is_storage() {
                    writer.add_storage(&child_path, child.clsid_bytes)?;
                    queue.push_back((child.sid, child_path));
                } else {
                    writer.add_stream_deferred(&child_path, child.size)?;
                    streams.insert(child_path, child.sid);
                }
            }
        }

        let start = out.stream_position()?;
        let file = &mut self.file;
        writer.write_to(out, &mut |path, sink| {
            let sid = *streams.get(path).ok_or_else(|| {
                io::Error::other(format!("no source for stream '{}'", path.join("/")))
            })?;
            let mut reader = file.stream_reader(sid).map_err(io::Error::other)?;
            io::copy(&mut reader, sink)
        })?;
        Ok(out.stream_position()? - start)
    }
}

impl<R: Read + Seek> Container for CompoundContainer<R> {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Compound
    }

    fn root(&self) -> ContainerNode {
        let root = self.file.root();
        ContainerNode {
            id: root.sid as u64,
            name: root.name.clone(),
            path: String::new(),
            kind: NodeKind::Storage,
            byte_len: None,
            content_type: None,
            relationship: None,
            class_id: root.clsid.clone(),
        }
    }

    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>> {
        Ok(self
            .file
            .children(node.id as u32)
            .into_iter()
            .map(|entry| Self::node(entry, node))
            .collect())
    }

    fn open_stream(&mut self, node: &ContainerNode) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.file.stream_reader(node.id as u32)?))
    }

    fn export(&mut self, node: &ContainerNode, out: &mut dyn WriteSeek) -> Result<u64> {
        if node.is_storage() {
            return self.export_storage(node, out);
        }
        let mut reader = self.open_stream(node)?;
        Ok(io::copy(&mut reader, out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfb::parse_clsid;
    use std::io::Cursor;

    const EXCEL_CLSID: &str = "00020820-0000-0000-C000-000000000046";

    fn sample() -> CompoundContainer<Cursor<Vec<u8>>> {
        let clsid = parse_clsid(EXCEL_CLSID).unwrap();
        let mut writer = CompoundWriter::new();
        writer.add_stream(&["WordDocument"], vec![0; 600]).unwrap();
        writer.add_storage(&["ObjectPool"], [0; 16]).unwrap();
        writer
            .add_storage(&["ObjectPool", "_1234567"], clsid)
            .unwrap();
        writer
            .add_stream(&["ObjectPool", "_1234567", "Workbook"], vec![9; 5000])
            .unwrap();
        writer
            .add_stream(&["ObjectPool", "_1234567", "\u{1}CompObj"], vec![3; 20])
            .unwrap();
        CompoundContainer::open(Cursor::new(writer.to_bytes().unwrap())).unwrap()
    }

    #[test]
    fn test_walk_nodes() {
        let container = sample();
        let root = container.root();
        assert!(root.is_root());

        let top = container.children(&root).unwrap();
        let pool = top.iter().find(|n| n.name == "ObjectPool").unwrap();
        assert_eq!(pool.kind, NodeKind::Storage);
        assert_eq!(pool.class_id, None);

        let objects = container.children(pool).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].path, "ObjectPool/_1234567");
        assert_eq!(objects[0].class_id.as_deref(), Some(EXCEL_CLSID));

        let streams = container.children(&objects[0]).unwrap();
        let workbook = streams.iter().find(|n| n.name == "Workbook").unwrap();
        assert_eq!(workbook.byte_len, Some(5000));
        // Streams carry the class of their enclosing storage
        assert_eq!(workbook.class_id.as_deref(), Some(EXCEL_CLSID));
    }

    #[test]
    fn test_top_level_names() {
        let container = sample();
        let mut names = container.top_level_names();
        names.sort();
        assert_eq!(names, ["ObjectPool", "WordDocument"]);
    }

    #[test]
    fn test_export_storage_as_standalone_file() {
        let mut container = sample();
        let root = container.root();
        let pool = container
            .children(&root)
            .unwrap()
            .into_iter()
            .find(|n| n.name == "ObjectPool")
            .unwrap();
        let object = container.children(&pool).unwrap().remove(0);

        let mut out = Cursor::new(Vec::new());
        let written = container.export(&object, &mut out).unwrap();
        assert_eq!(written, out.get_ref().len() as u64);

        let mut exported = CompoundFile::open(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(exported.root().clsid.as_deref(), Some(EXCEL_CLSID));
        assert_eq!(exported.read_stream(&["Workbook"]).unwrap(), vec![9; 5000]);
        assert_eq!(exported.read_stream(&["\u{1}CompObj"]).unwrap(), vec![3; 20]);
    }

    #[test]
    fn test_export_stream_copies_bytes() {
        let mut container = sample();
        let root = container.root();
        let doc = container
            .children(&root)
            .unwrap()
            .into_iter()
            .find(|n| n.name == "WordDocument")
            .unwrap();

        let mut out = Cursor::new(Vec::new());
        assert_eq!(container.export(&doc, &mut out).unwrap(), 600);
        assert_eq!(out.into_inner(), vec![0; 600]);
    }
}
