//! Fixture builders shared by the unit tests.

use crate::cfb::{CompoundWriter, parse_clsid};
use crate::opc::constants::{content_type, relationship_type, target_mode};
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub(crate) const WORD_DOCUMENT_CLSID: &str = "00020906-0000-0000-C000-000000000046";
pub(crate) const EXCEL_SHEET_CLSID: &str = "00020820-0000-0000-C000-000000000046";
pub(crate) const WORD_PACKAGE_CLSID: &str = "F4754C9B-64F5-4B40-8AF4-679732AC0607";
/// OLE Package (packager shell object)
pub(crate) const PACKAGER_CLSID: &str = "0003000C-0000-0000-C000-000000000046";

/// Minimal `[Content_Types].xml`
pub(crate) const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

pub(crate) fn clsid(text: &str) -> [u8; 16] {
    parse_clsid(text).unwrap()
}

/// A ZIP archive with the given members, deflated, in order.
pub(crate) fn zip_of(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Overwrite the start of a member's compressed data so that inflating it
/// fails. Headers and the central directory are left intact.
pub(crate) fn corrupt_member(zip: &mut [u8], name: &str) {
    const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
    const LOCAL_HEADER_LEN: usize = 30;

    let header = (0..zip.len().saturating_sub(LOCAL_HEADER_LEN))
        .find(|&at| {
            zip[at..].starts_with(LOCAL_HEADER)
                && zip[at + LOCAL_HEADER_LEN..].starts_with(name.as_bytes())
        })
        .unwrap();
    let name_len = u16::from_le_bytes([zip[header + 26], zip[header + 27]]) as usize;
    let extra_len = u16::from_le_bytes([zip[header + 28], zip[header + 29]]) as usize;
    let data = header + LOCAL_HEADER_LEN + name_len + extra_len;
    // BFINAL set with the reserved block type 11
    zip[data..data + 4].fill(0xFF);
}

/// A compound file with the given streams. Paths use `/`; storages on the
/// way are created with a null class.
pub(crate) fn compound_of(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = CompoundWriter::new();
    let mut storages: Vec<Vec<String>> = Vec::new();
    for (path, data) in streams {
        let parts: Vec<String> = path.split('/').map(str::to_string).collect();
        for depth in 1..parts.len() {
            let storage = parts[..depth].to_vec();
            if !storages.contains(&storage) {
                writer.add_storage(storage.as_slice(), [0; 16]).unwrap();
                storages.push(storage);
            }
        }
        writer.add_stream(parts.as_slice(), data.to_vec()).unwrap();
    }
    writer.to_bytes().unwrap()
}

/// Start of a Word 97 `WordDocument` stream (FIB base).
pub(crate) fn word_fib(encrypted: bool) -> Vec<u8> {
    let mut fib = vec![0u8; 64];
    fib[0..2].copy_from_slice(&0xA5ECu16.to_le_bytes());
    fib[2..4].copy_from_slice(&0x00C1u16.to_le_bytes());
    if encrypted {
        fib[0x0A..0x0C].copy_from_slice(&0x0100u16.to_le_bytes());
    }
    fib
}

fn biff_record(out: &mut Vec<u8>, record: u16, data: &[u8]) {
    out.extend_from_slice(&record.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

/// A short BIFF8 workbook stream: BOF, optional FILEPASS, a few records, EOF.
pub(crate) fn biff_stream(filepass: bool) -> Vec<u8> {
    let mut out = Vec::new();
    biff_record(&mut out, 0x0809, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0]);
    // INTERFACEHDR, MMS
    biff_record(&mut out, 0x00E1, &[0xB0, 0x04]);
    biff_record(&mut out, 0x00C1, &[0, 0]);
    if filepass {
        biff_record(&mut out, 0x002F, &[1, 0, 1, 0, 1, 0]);
    }
    // CODEPAGE
    biff_record(&mut out, 0x0042, &[0xB0, 0x04]);
    biff_record(&mut out, 0x000A, &[]);
    out
}

struct Rel {
    reltype: String,
    target: String,
    external: bool,
}

/// Builds a minimal WordprocessingML package with embedded parts.
///
/// The document part is `word/document.xml`; embeds hang off it.
pub(crate) struct PackageBuilder {
    embeds: Vec<(String, Vec<u8>)>,
    rels: Vec<Rel>,
    overrides: Vec<(String, String)>,
    extra: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub(crate) fn docx() -> Self {
        Self {
            embeds: Vec::new(),
            rels: Vec::new(),
            overrides: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Add a part referenced from the document through `reltype`.
    pub(crate) fn embed(mut self, member: &str, reltype: &str, data: &[u8]) -> Self {
        let target = match member.strip_prefix("word/") {
            Some(relative) => relative.to_string(),
            None => format!("/{member}"),
        };
        self.rels.push(Rel {
            reltype: reltype.to_string(),
            target,
            external: false,
        });
        self.embeds.push((member.to_string(), data.to_vec()));
        self
    }

    /// Like [`embed`](Self::embed) with an explicit content type override.
    pub(crate) fn embed_typed(
        mut self,
        member: &str,
        reltype: &str,
        content_type: &str,
        data: &[u8],
    ) -> Self {
        self.overrides
            .push((format!("/{member}"), content_type.to_string()));
        self.embed(member, reltype, data)
    }

    /// Add a relationship whose target is outside the package.
    pub(crate) fn external(mut self, reltype: &str, url: &str) -> Self {
        self.rels.push(Rel {
            reltype: reltype.to_string(),
            target: url.to_string(),
            external: true,
        });
        self
    }

    /// Add a relationship from the document without adding the target.
    pub(crate) fn dangling(mut self, reltype: &str, target: &str) -> Self {
        self.rels.push(Rel {
            reltype: reltype.to_string(),
            target: target.to_string(),
            external: false,
        });
        self
    }

    /// Add a raw member that no relationship points at.
    pub(crate) fn member(mut self, name: &str, data: &[u8]) -> Self {
        self.extra.push((name.to_string(), data.to_vec()));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for (ext, ct) in [
            ("rels", content_type::OPC_RELATIONSHIPS),
            ("xml", content_type::XML),
            ("bin", content_type::OFC_OLE_OBJECT),
            ("png", content_type::PNG),
            ("docx", content_type::WML_DOCUMENT),
            ("xlsx", content_type::SML_SHEET),
            ("emf", "image/x-emf"),
        ] {
            types.push_str(&format!(r#"<Default Extension="{ext}" ContentType="{ct}"/>"#));
        }
        types.push_str(&format!(
            r#"<Override PartName="/word/document.xml" ContentType="{}"/>"#,
            content_type::WML_DOCUMENT_MAIN
        ));
        for (part, ct) in &self.overrides {
            types.push_str(&format!(r#"<Override PartName="{part}" ContentType="{ct}"/>"#));
        }
        types.push_str("</Types>");

        let package_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{}" Target="word/document.xml"/></Relationships>"#,
            relationship_type::OFFICE_DOCUMENT
        );

        let mut document_rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, rel) in self.rels.iter().enumerate() {
            let mode = if rel.external {
                format!(r#" TargetMode="{}""#, target_mode::EXTERNAL)
            } else {
                String::new()
            };
            document_rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}" Target="{}"{mode}/>"#,
                i + 1,
                rel.reltype,
                rel.target
            ));
        }
        document_rels.push_str("</Relationships>");

        let document = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body/></w:document>"#;

        let mut members: Vec<(String, Vec<u8>)> = vec![
            ("[Content_Types].xml".to_string(), types.into_bytes()),
            ("_rels/.rels".to_string(), package_rels.into_bytes()),
            ("word/document.xml".to_string(), document.as_bytes().to_vec()),
            (
                "word/_rels/document.xml.rels".to_string(),
                document_rels.into_bytes(),
            ),
        ];
        members.extend(self.embeds);
        members.extend(self.extra);

        let borrowed: Vec<(&str, &[u8])> = members
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        zip_of(&borrowed)
    }
}

/// A Word 97 document whose ObjectPool holds the given object storages.
///
/// Each entry is `(storage name, class, streams)`.
pub(crate) fn word_with_objects(objects: &[(&str, &str, &[(&str, &[u8])])]) -> Vec<u8> {
    let mut writer = CompoundWriter::new();
    writer.set_root_clsid(clsid(WORD_DOCUMENT_CLSID));
    writer.add_stream(&["WordDocument"], word_fib(false)).unwrap();
    writer.add_stream(&["1Table"], vec![0; 16]).unwrap();
    writer.add_storage(&["ObjectPool"], [0; 16]).unwrap();
    for &(name, class, streams) in objects {
        writer
            .add_storage(&["ObjectPool", name], clsid(class))
            .unwrap();
        for &(stream, data) in streams {
            writer
                .add_stream(&["ObjectPool", name, stream], data.to_vec())
                .unwrap();
        }
    }
    writer.to_bytes().unwrap()
}
