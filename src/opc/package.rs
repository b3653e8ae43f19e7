//! Read-only OPC package over a ZIP archive.
//!
//! Content types and every relationships part are parsed when the package is
//! opened (they are small XML parts). Part content is only decompressed when
//! a caller opens the part, and then streamed.

use super::constants::target_mode;
use super::error::{OpcError, Result};
use super::packuri::{CONTENT_TYPES_URI, PackURI};
use quick_xml::Reader;
use quick_xml::events::Event;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::warn;
use zip::ZipArchive;

/// Most memory reserved up front when reading a part. The declared size
/// comes from the archive and is not trusted beyond this.
const MAX_PREALLOC: u64 = 1 << 20;

/// A relationship as read from a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Base URI for resolving relative references
    pub base_uri: String,
    /// Relationship ID (e.g. "rId1")
    pub r_id: String,
    /// Relationship type URI
    pub reltype: String,
    /// Target reference (relative URI or external URL)
    pub target_ref: String,
    pub target_mode: String,
}

impl Relationship {
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == target_mode::EXTERNAL
    }

    /// Absolute partname of an internal relationship's target.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external() {
            return Err(OpcError::InvalidRelationship(format!(
                "'{}' points outside the package",
                self.target_ref
            )));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref)
    }
}

/// Content type lookup from `[Content_Types].xml`.
///
/// Overrides are keyed by partname, defaults by extension; both
/// case-insensitively, as OPC part names are.
#[derive(Debug, Default)]
struct ContentTypeMap {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypeMap {
    fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::default();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    let kind = match e.local_name().as_ref() {
                        b"Default" => Some((b"Extension".as_slice(), true)),
                        b"Override" => Some((b"PartName".as_slice(), false)),
                        _ => None,
                    };
                    let Some((key_attr, is_default)) = kind else {
                        buf.clear();
                        continue;
                    };

                    let mut key = None;
                    let mut content_type = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == key_attr {
                            key = Some(attr.unescape_value()?.to_lowercase());
                        } else if attr.key.as_ref() == b"ContentType" {
                            content_type = Some(attr.unescape_value()?.to_string());
                        }
                    }

                    if let (Some(key), Some(ct)) = (key, content_type) {
                        if is_default {
                            map.defaults.insert(key, ct);
                        } else {
                            map.overrides.insert(key, ct);
                        }
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "Content types parse error: {e}"
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(map)
    }

    fn get(&self, partname: &PackURI) -> Option<&str> {
        self.overrides
            .get(&partname.as_str().to_lowercase())
            .or_else(|| self.defaults.get(&partname.ext().to_lowercase()))
            .map(String::as_str)
    }
}

/// Parse a `.rels` part.
fn parse_rels_xml(rels_xml: &[u8], base_uri: &str) -> Result<SmallVec<[Relationship; 8]>> {
    let mut rels = SmallVec::new();
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut r_id = None;
                let mut reltype = None;
                let mut target_ref = None;
                let mut target_mode = target_mode::INTERNAL.to_string();

                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => r_id = Some(attr.unescape_value()?.to_string()),
                        b"Type" => reltype = Some(attr.unescape_value()?.to_string()),
                        b"Target" => target_ref = Some(attr.unescape_value()?.to_string()),
                        b"TargetMode" => target_mode = attr.unescape_value()?.to_string(),
                        _ => {},
                    }
                }

                if let (Some(r_id), Some(reltype), Some(target_ref)) = (r_id, reltype, target_ref) {
                    rels.push(Relationship {
                        base_uri: base_uri.to_string(),
                        r_id,
                        reltype,
                        target_ref,
                        target_mode,
                    });
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpcError::XmlError(format!("Rels parse error: {e}"))),
            _ => {},
        }
        buf.clear();
    }

    Ok(rels)
}

#[derive(Debug, Clone)]
struct Member {
    name: String,
    size: u64,
}

/// An OPC package
pub struct Package<R: Read + Seek> {
    archive: ZipArchive<R>,
    /// Lowercase partname -> ZIP member
    members: HashMap<String, Member>,
    /// Member names in archive order
    order: Vec<String>,
    content_types: ContentTypeMap,
    /// Lowercase source partname -> relationships
    rels: HashMap<String, SmallVec<[Relationship; 8]>>,
}

impl<R: Read + Seek> Package<R> {
    /// Open a package. A ZIP archive without `[Content_Types].xml` is
    /// [`OpcError::NotAPackage`].
    pub fn open(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;

        let mut members = HashMap::new();
        let mut order = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let partname = PackURI::from_membername(&name);
            members.insert(
                partname.as_str().to_lowercase(),
                Member {
                    name: name.clone(),
                    size: file.size(),
                },
            );
            order.push(name);
        }

        let content_types_key = CONTENT_TYPES_URI.to_lowercase();
        let Some(content_types_member) = members.get(&content_types_key).cloned() else {
            return Err(OpcError::NotAPackage);
        };
        let content_types =
            ContentTypeMap::from_xml(&read_member(&mut archive, &content_types_member.name)?)?;

        let mut rels = HashMap::new();
        for name in &order {
            let rels_uri = PackURI::from_membername(name);
            let Some(source) = rels_uri.rels_source() else {
                continue;
            };

            // A broken relationships part hides its targets, nothing more
            let parsed = read_member(&mut archive, name)
                .and_then(|xml| parse_rels_xml(&xml, source.base_uri()));
            match parsed {
                Ok(list) => {
                    rels.insert(source.as_str().to_lowercase(), list);
                },
                Err(e) => warn!(part = %rels_uri, error = %e, "skipping unreadable relationships part"),
            }
        }

        Ok(Self {
            archive,
            members,
            order,
            content_types,
            rels,
        })
    }

    /// Relationships whose source is `source`, in document order.
    pub fn relationships(&self, source: &PackURI) -> &[Relationship] {
        self.rels
            .get(&source.as_str().to_lowercase())
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `partname` is the source of a relationships part.
    pub fn has_rels(&self, partname: &PackURI) -> bool {
        self.rels.contains_key(&partname.as_str().to_lowercase())
    }

    /// Content type of a part (override first, then extension default).
    pub fn content_type(&self, partname: &PackURI) -> Option<&str> {
        self.content_types.get(partname)
    }

    pub fn contains(&self, partname: &PackURI) -> bool {
        self.members.contains_key(&partname.as_str().to_lowercase())
    }

    /// Uncompressed size of a part.
    pub fn part_size(&self, partname: &PackURI) -> Option<u64> {
        self.member(partname).ok().map(|m| m.size)
    }

    /// Stream a part's decompressed content.
    pub fn open_part(&mut self, partname: &PackURI) -> Result<Box<dyn Read + '_>> {
        let name = self.member(partname)?.name.clone();
        Ok(Box::new(self.archive.by_name(&name)?))
    }

    /// Read a whole part into memory.
    pub fn read_part(&mut self, partname: &PackURI) -> Result<Vec<u8>> {
        let name = self.member(partname)?.name.clone();
        read_member(&mut self.archive, &name)
    }

    /// ZIP member names in archive order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn member(&self, partname: &PackURI) -> Result<&Member> {
        self.members
            .get(&partname.as_str().to_lowercase())
            .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))
    }
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name)?;
    let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}
