//! Password-protection detection.
//!
//! Encrypted content cannot be searched, so each container is checked once
//! before it is traversed. Detection only looks at markers; nothing is
//! decrypted.

use crate::common::error::Result;
use crate::container::{Container, ContainerFormat, ContainerNode};
use std::fmt;
use std::io::{self, Read};

/// How a container is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionKind {
    /// OOXML package wrapped in an encrypted compound file
    EncryptedPackage,
    /// Word binary document with the FIB `fEncrypted` flag
    EncryptedWordDocument,
    /// Excel binary workbook with a `FILEPASS` record
    EncryptedWorkbook,
    /// PowerPoint binary presentation with an `EncryptedSummary` stream
    EncryptedPresentation,
}

impl fmt::Display for ProtectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtectionKind::EncryptedPackage => "encrypted package",
            ProtectionKind::EncryptedWordDocument => "encrypted Word document",
            ProtectionKind::EncryptedWorkbook => "encrypted workbook",
            ProtectionKind::EncryptedPresentation => "encrypted presentation",
        })
    }
}

// Word FIB
const FIB_IDENTS: [u16; 2] = [0xA5EC, 0xA5DC];
const FIB_FLAGS_OFFSET: usize = 0x0A;
const FIB_ENCRYPTED: u16 = 0x0100;

// BIFF records
const BIFF_FILEPASS: u16 = 0x002F;
const BIFF_EOF: u16 = 0x000A;
const BIFF_SCAN_RECORDS: usize = 16;

/// Check a container for password protection.
pub fn detect(container: &mut dyn Container) -> Result<Option<ProtectionKind>> {
    if let Some(kind) = detect_by_name(&container.top_level_names()) {
        return Ok(Some(kind));
    }
    if container.format() != ContainerFormat::Compound {
        return Ok(None);
    }

    let root = container.root();
    for child in container.children(&root)? {
        if child.is_storage() {
            continue;
        }
        if child.name.eq_ignore_ascii_case("WordDocument") {
            if word_document_encrypted(container, &child)? {
                return Ok(Some(ProtectionKind::EncryptedWordDocument));
            }
        } else if (child.name.eq_ignore_ascii_case("Workbook")
            || child.name.eq_ignore_ascii_case("Book"))
            && workbook_encrypted(container, &child)?
        {
            return Ok(Some(ProtectionKind::EncryptedWorkbook));
        }
    }
    Ok(None)
}

fn detect_by_name(names: &[String]) -> Option<ProtectionKind> {
    names.iter().find_map(|name| {
        if name.eq_ignore_ascii_case("EncryptionInfo")
            || name.eq_ignore_ascii_case("EncryptedPackage")
            || name.eq_ignore_ascii_case("\u{6}DataSpaces")
        {
            Some(ProtectionKind::EncryptedPackage)
        } else if name.eq_ignore_ascii_case("EncryptedSummary") {
            Some(ProtectionKind::EncryptedPresentation)
        } else {
            None
        }
    })
}

/// Fill `buf` as far as the reader allows; returns the bytes read.
fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn word_document_encrypted(container: &mut dyn Container, node: &ContainerNode) -> Result<bool> {
    let mut fib = [0u8; FIB_FLAGS_OFFSET + 2];
    let mut reader = container.open_stream(node)?;
    if read_up_to(&mut reader, &mut fib)? < fib.len() {
        return Ok(false);
    }
    let ident = u16::from_le_bytes([fib[0], fib[1]]);
    let flags = u16::from_le_bytes([fib[FIB_FLAGS_OFFSET], fib[FIB_FLAGS_OFFSET + 1]]);
    Ok(FIB_IDENTS.contains(&ident) && flags & FIB_ENCRYPTED != 0)
}

fn workbook_encrypted(container: &mut dyn Container, node: &ContainerNode) -> Result<bool> {
    let mut reader = container.open_stream(node)?;
    let mut header = [0u8; 4];
    for _ in 0..BIFF_SCAN_RECORDS {
        if read_up_to(&mut reader, &mut header)? < header.len() {
            break;
        }
        let record = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as u64;
        match record {
            BIFF_FILEPASS => return Ok(true),
            BIFF_EOF => break,
            _ => {
                let skipped = io::copy(&mut (&mut reader).take(len), &mut io::sink())?;
                if skipped < len {
                    break;
                }
            },
        }
    }
    Ok(false)
}
