//! Minimal compound file writer
//!
//! Produces version 3 files (512-byte sectors, 64-byte mini sectors) from a
//! tree of storages and streams. Stream content is either held in memory or
//! *deferred*: only its length is known up front and the bytes are pulled
//! through a callback while the file is written, so exporting a large
//! embedded storage never buffers it whole.
//!
//! # Layout
//!
//! ```text
//! header | large streams | mini stream | MiniFAT | directory | DIFAT | FAT
//! ```
//!
//! Children of every storage are sorted with the usual compound file
//! ordering (shorter names first, then case-insensitive) and linked into a
//! balanced binary tree.

use super::consts::*;
use super::error::{CfbError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, Write};

const SECTOR: usize = SECTOR_SIZE_V3;
const IDS_PER_SECTOR: usize = SECTOR / 4;
const ZEROES: [u8; SECTOR] = [0; SECTOR];

/// Source of a deferred stream: receives the stream path and a sink, returns
/// the number of bytes written.
pub type FillFn<'a> = dyn FnMut(&[String], &mut dyn Write) -> io::Result<u64> + 'a;

#[derive(Debug)]
enum Content {
    Inline(Vec<u8>),
    Deferred(u64),
}

impl Content {
    fn len(&self) -> u64 {
        match self {
            Content::Inline(data) => data.len() as u64,
            Content::Deferred(len) => *len,
        }
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    path: Vec<String>,
    entry_type: u8,
    clsid: [u8; 16],
    content: Option<Content>,
    children: Vec<usize>,
}

/// Placement of one stream in the output
#[derive(Debug, Clone, Copy, Default)]
struct Placement {
    start: u32,
    size: u64,
}

/// Builder for a standalone compound file
#[derive(Debug)]
pub struct CompoundWriter {
    /// Index 0 is the root storage
    nodes: Vec<Node>,
    by_path: HashMap<Vec<String>, usize>,
}

impl Default for CompoundWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompoundWriter {
    pub fn new() -> Self {
        let root = Node {
            name: "Root Entry".to_string(),
            path: Vec::new(),
            entry_type: STGTY_ROOT,
            clsid: [0; 16],
            content: None,
            children: Vec::new(),
        };
        let mut by_path = HashMap::new();
        by_path.insert(Vec::new(), 0);
        Self {
            nodes: vec![root],
            by_path,
        }
    }

    /// Set the class of the root storage.
    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.nodes[0].clsid = clsid;
    }

    /// Add a storage; missing parents are created with no class.
    pub fn add_storage<S: AsRef<str>>(&mut self, path: &[S], clsid: [u8; 16]) -> Result<()> {
        let path = owned_path(path)?;
        let index = self.ensure_storage(&path)?;
        self.nodes[index].clsid = clsid;
        Ok(())
    }

    /// Add a stream whose content is known now.
    pub fn add_stream<S: AsRef<str>>(&mut self, path: &[S], data: Vec<u8>) -> Result<()> {
        self.insert_stream(owned_path(path)?, Content::Inline(data))
    }

    /// Add a stream of `len` bytes whose content is supplied later by the
    /// fill callback of [`write_to`](Self::write_to).
    pub fn add_stream_deferred<S: AsRef<str>>(&mut self, path: &[S], len: u64) -> Result<()> {
        self.insert_stream(owned_path(path)?, Content::Deferred(len))
    }

    fn insert_stream(&mut self, path: Vec<String>, content: Content) -> Result<()> {
        if path.is_empty() {
            return Err(CfbError::InvalidFormat("Stream path must not be empty".to_string()));
        }
        if content.len() > u32::MAX as u64 {
            return Err(CfbError::InvalidFormat(format!(
                "Stream '{}' is too large for a version 3 file",
                path.join("/")
            )));
        }
        if self.by_path.contains_key(&path) {
            return Err(CfbError::InvalidFormat(format!(
                "Duplicate entry '{}'",
                path.join("/")
            )));
        }

        let parent = self.ensure_storage(&path[..path.len() - 1])?;
        self.push_node(parent, path, STGTY_STREAM, Some(content));
        Ok(())
    }

    fn ensure_storage(&mut self, path: &[String]) -> Result<usize> {
        let mut parent = 0;
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            parent = match self.by_path.get(prefix) {
                Some(&index) if self.nodes[index].entry_type == STGTY_STREAM => {
                    return Err(CfbError::InvalidFormat(format!(
                        "'{}' is a stream, not a storage",
                        prefix.join("/")
                    )));
                },
                Some(&index) => index,
                None => self.push_node(parent, prefix.to_vec(), STGTY_STORAGE, None),
            };
        }
        Ok(parent)
    }

    fn push_node(
        &mut self,
        parent: usize,
        path: Vec<String>,
        entry_type: u8,
        content: Option<Content>,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            name: path.last().cloned().unwrap_or_default(),
            path: path.clone(),
            entry_type,
            clsid: [0; 16],
            content,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        self.by_path.insert(path, index);
        index
    }

    /// Write the compound file, pulling deferred streams from `fill`.
    ///
    /// A deferred stream whose callback writes a different number of bytes
    /// than declared fails the whole write.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, fill: &mut FillFn<'_>) -> Result<()> {
        // Streams below the cutoff go to the mini stream
        let mut placements = vec![Placement::default(); self.nodes.len()];
        let mut big = Vec::new();
        let mut mini = Vec::new();
        let mut mini_sectors = 0usize;
        let mut minifat: Vec<u32> = Vec::new();

        for (index, node) in self.nodes.iter().enumerate() {
            let Some(content) = &node.content else {
                continue;
            };
            let size = content.len();
            placements[index] = Placement {
                start: ENDOFCHAIN,
                size,
            };
            if size == 0 {
                continue;
            }
            if size < MINI_STREAM_CUTOFF as u64 {
                let count = size.div_ceil(MINI_SECTOR_SIZE as u64) as usize;
                placements[index].start = mini_sectors as u32;
                push_chain(&mut minifat, mini_sectors, count);
                mini_sectors += count;
                mini.push(index);
            } else {
                big.push(index);
            }
        }

        let ministream_len = mini_sectors * MINI_SECTOR_SIZE;
        let ministream_sectors = ministream_len.div_ceil(SECTOR);
        let minifat_sectors = (minifat.len() * 4).div_ceil(SECTOR);
        let dir_sectors = (self.nodes.len() * DIRENTRY_SIZE).div_ceil(SECTOR);

        let mut next = 0usize;
        for &index in &big {
            placements[index].start = next as u32;
            next += (placements[index].size as usize).div_ceil(SECTOR);
        }
        let big_sectors = next;

        let ministream_start = big_sectors;
        let minifat_start = ministream_start + ministream_sectors;
        let dir_start = minifat_start + minifat_sectors;
        let data_sectors = dir_start + dir_sectors;

        // FAT and DIFAT must also describe themselves
        let (mut fat_count, mut difat_count) = (0usize, 0usize);
        loop {
            let fat = (data_sectors + fat_count + difat_count).div_ceil(IDS_PER_SECTOR);
            let difat = fat
                .saturating_sub(HEADER_DIFAT_ENTRIES)
                .div_ceil(IDS_PER_SECTOR - 1);
            if fat == fat_count && difat == difat_count {
                break;
            }
            fat_count = fat;
            difat_count = difat;
        }
        let difat_start = data_sectors;
        let fat_start = difat_start + difat_count;

        let mut fat = vec![FREESECT; fat_count * IDS_PER_SECTOR];
        for &index in &big {
            let count = (placements[index].size as usize).div_ceil(SECTOR);
            write_chain(&mut fat, placements[index].start as usize, count);
        }
        write_chain(&mut fat, ministream_start, ministream_sectors);
        write_chain(&mut fat, minifat_start, minifat_sectors);
        write_chain(&mut fat, dir_start, dir_sectors);
        fat[difat_start..fat_start].fill(DIFSECT);
        fat[fat_start..fat_start + fat_count].fill(FATSECT);

        let root_start = if ministream_sectors > 0 {
            ministream_start as u32
        } else {
            ENDOFCHAIN
        };
        placements[0] = Placement {
            start: root_start,
            size: ministream_len as u64,
        };

        let fat_ids: Vec<u32> = (fat_start..fat_start + fat_count).map(|s| s as u32).collect();

        out.write_all(&self.header(
            dir_start as u32,
            if minifat_sectors > 0 { minifat_start as u32 } else { ENDOFCHAIN },
            minifat_sectors as u32,
            if difat_count > 0 { difat_start as u32 } else { ENDOFCHAIN },
            difat_count as u32,
            &fat_ids,
        ))?;

        for &index in &big {
            self.write_content(out, index, fill)?;
            pad(out, placements[index].size as usize, SECTOR)?;
        }

        for &index in &mini {
            self.write_content(out, index, fill)?;
            pad(out, placements[index].size as usize, MINI_SECTOR_SIZE)?;
        }
        pad(out, ministream_len, SECTOR)?;

        if minifat_sectors > 0 {
            minifat.resize(minifat_sectors * IDS_PER_SECTOR, FREESECT);
            write_ids(out, &minifat)?;
        }

        out.write_all(&self.directory(&placements))?;
        pad(out, self.nodes.len() * DIRENTRY_SIZE, SECTOR)?;

        // DIFAT sectors carry the FAT IDs the header has no room for
        let overflow = fat_ids.get(HEADER_DIFAT_ENTRIES..).unwrap_or(&[]);
        for i in 0..difat_count {
            let mut ids = vec![FREESECT; IDS_PER_SECTOR];
            let chunk = overflow
                .chunks(IDS_PER_SECTOR - 1)
                .nth(i)
                .unwrap_or(&[]);
            ids[..chunk.len()].copy_from_slice(chunk);
            ids[IDS_PER_SECTOR - 1] = if i + 1 < difat_count {
                (difat_start + i + 1) as u32
            } else {
                ENDOFCHAIN
            };
            write_ids(out, &ids)?;
        }

        write_ids(out, &fat)?;
        out.flush()?;
        Ok(())
    }

    /// Write the file into memory. Deferred streams are an error here.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out, &mut |path, _| {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("No source for deferred stream '{}'", path.join("/")),
            ))
        })?;
        Ok(out)
    }

    fn write_content<W: Write + ?Sized>(
        &self,
        out: &mut W,
        index: usize,
        fill: &mut FillFn<'_>,
    ) -> Result<()> {
        let node = &self.nodes[index];
        match &node.content {
            Some(Content::Inline(data)) => out.write_all(data)?,
            Some(Content::Deferred(len)) => {
                let mut counter = CountingWriter {
                    inner: out,
                    count: 0,
                };
                fill(&node.path, &mut counter)?;
                if counter.count != *len {
                    return Err(CfbError::InvalidFormat(format!(
                        "Stream '{}' declared {} bytes but {} were written",
                        node.path.join("/"),
                        len,
                        counter.count
                    )));
                }
            },
            None => {},
        }
        Ok(())
    }

    fn header(
        &self,
        first_dir: u32,
        first_minifat: u32,
        num_minifat: u32,
        first_difat: u32,
        num_difat: u32,
        fat_ids: &[u32],
    ) -> Vec<u8> {
        let mut header = vec![0u8; SECTOR];
        header[0..8].copy_from_slice(MAGIC);
        header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
        header[26..28].copy_from_slice(&3u16.to_le_bytes());
        header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
        header[30..32].copy_from_slice(&9u16.to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());
        // csectDir stays 0 for 512-byte sectors
        header[44..48].copy_from_slice(&(fat_ids.len() as u32).to_le_bytes());
        header[48..52].copy_from_slice(&first_dir.to_le_bytes());
        header[56..60].copy_from_slice(&MINI_STREAM_CUTOFF.to_le_bytes());
        header[60..64].copy_from_slice(&first_minifat.to_le_bytes());
        header[64..68].copy_from_slice(&num_minifat.to_le_bytes());
        header[68..72].copy_from_slice(&first_difat.to_le_bytes());
        header[72..76].copy_from_slice(&num_difat.to_le_bytes());

        for i in 0..HEADER_DIFAT_ENTRIES {
            let id = fat_ids.get(i).copied().unwrap_or(FREESECT);
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&id.to_le_bytes());
        }
        header
    }

    /// Serialize the directory, linking siblings into balanced trees.
    fn directory(&self, placements: &[Placement]) -> Vec<u8> {
        let mut links = vec![(NOSTREAM, NOSTREAM, NOSTREAM); self.nodes.len()];

        for (index, node) in self.nodes.iter().enumerate() {
            if node.children.is_empty() {
                continue;
            }
            let mut sorted = node.children.clone();
            sorted.sort_by(|&a, &b| compare_names(&self.nodes[a].name, &self.nodes[b].name));
            let root = link_balanced(&sorted, &mut links);
            links[index].2 = root;
        }

        let mut data = Vec::with_capacity(self.nodes.len() * DIRENTRY_SIZE);
        for (index, node) in self.nodes.iter().enumerate() {
            let (left, right, child) = links[index];
            let placement = placements[index];

            let mut entry = [0u8; DIRENTRY_SIZE];
            let units: Vec<u16> = node.name.encode_utf16().take(MAX_NAME_UNITS).collect();
            for (i, unit) in units.iter().enumerate() {
                entry[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
            entry[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
            entry[66] = node.entry_type;
            // All nodes black
            entry[67] = 1;
            entry[68..72].copy_from_slice(&left.to_le_bytes());
            entry[72..76].copy_from_slice(&right.to_le_bytes());
            entry[76..80].copy_from_slice(&child.to_le_bytes());
            entry[80..96].copy_from_slice(&node.clsid);
            entry[116..120].copy_from_slice(&placement.start.to_le_bytes());
            entry[120..128].copy_from_slice(&placement.size.to_le_bytes());
            data.extend_from_slice(&entry);
        }
        data
    }
}

/// Link a sorted run of siblings into a balanced tree, returning its root.
fn link_balanced(sorted: &[usize], links: &mut [(u32, u32, u32)]) -> u32 {
    if sorted.is_empty() {
        return NOSTREAM;
    }
    let mid = sorted.len() / 2;
    let left = link_balanced(&sorted[..mid], links);
    let right = link_balanced(&sorted[mid + 1..], links);
    links[sorted[mid]].0 = left;
    links[sorted[mid]].1 = right;
    sorted[mid] as u32
}

/// Compound file sibling order: shorter names first, then case-insensitive.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.encode_utf16()
        .count()
        .cmp(&b.encode_utf16().count())
        .then_with(|| a.to_uppercase().cmp(&b.to_uppercase()))
}

fn owned_path<S: AsRef<str>>(path: &[S]) -> Result<Vec<String>> {
    path.iter()
        .map(|part| {
            let part = part.as_ref();
            let units = part.encode_utf16().count();
            if units == 0 || units > MAX_NAME_UNITS {
                return Err(CfbError::InvalidFormat(format!(
                    "Entry name '{part}' must be 1 to {MAX_NAME_UNITS} UTF-16 units long"
                )));
            }
            if part.contains(['/', '\\', ':', '!']) {
                return Err(CfbError::InvalidFormat(format!(
                    "Entry name '{part}' contains a reserved character"
                )));
            }
            Ok(part.to_string())
        })
        .collect()
}

/// Append a contiguous chain of `count` entries starting at `start`.
fn push_chain(table: &mut Vec<u32>, start: usize, count: usize) {
    table.extend((start + 1..start + count).map(|s| s as u32));
    table.push(ENDOFCHAIN);
}

fn write_chain(table: &mut [u32], start: usize, count: usize) {
    for sector in start..start + count {
        table[sector] = if sector + 1 < start + count {
            sector as u32 + 1
        } else {
            ENDOFCHAIN
        };
    }
}

fn write_ids<W: Write + ?Sized>(out: &mut W, ids: &[u32]) -> io::Result<()> {
    let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_le_bytes()).collect();
    out.write_all(&bytes)
}

/// Zero-fill up to the next multiple of `unit`.
fn pad<W: Write + ?Sized>(out: &mut W, written: usize, unit: usize) -> io::Result<()> {
    let rest = written % unit;
    if rest == 0 {
        return Ok(());
    }
    out.write_all(&ZEROES[..unit - rest])
}

struct CountingWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    count: u64,
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
