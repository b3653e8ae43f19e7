use super::consts::*;
use super::error::{CfbError, Result};
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw compound file header (512 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    dll_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector IDs
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Raw directory entry (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: U64<LE>,
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Unused slot (also obsolete ILockBytes / IPropertyStorage entries)
    Empty,
    Storage,
    Stream,
    Root,
}

impl EntryKind {
    fn from_raw(value: u8) -> Self {
        match value {
            STGTY_STORAGE => EntryKind::Storage,
            STGTY_STREAM => EntryKind::Stream,
            STGTY_ROOT => EntryKind::Root,
            _ => EntryKind::Empty,
        }
    }

    /// Whether the entry can have children.
    #[inline]
    pub fn is_storage(self) -> bool {
        matches!(self, EntryKind::Storage | EntryKind::Root)
    }
}

/// A storage or stream of a compound file
#[derive(Debug, Clone)]
pub struct Entry {
    /// Storage ID (index in directory)
    pub sid: u32,
    /// Entry name (UTF-16 decoded)
    pub name: String,
    pub kind: EntryKind,
    /// Formatted CLSID, `None` when all zeros
    pub clsid: Option<String>,
    /// Raw CLSID bytes as stored on disk
    pub clsid_bytes: [u8; 16],
    /// Size of the stream in bytes (mini stream size for the root)
    pub size: u64,
    /// First sector (or mini sector) of the stream
    pub start_sector: u32,
    left: u32,
    right: u32,
    child: u32,
}

/// Read-only compound file
///
/// Sector tables and the directory are loaded eagerly on [`open`](Self::open);
/// stream content is only read through [`stream_reader`](Self::stream_reader).
#[derive(Debug)]
pub struct CompoundFile<R> {
    reader: R,
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u64,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    entries: Vec<Entry>,
    /// Sectors holding the mini stream, in order
    ministream: Vec<u32>,
}

impl<R: Read + Seek> CompoundFile<R> {
    /// Parse the header, sector tables and directory of a compound file.
    pub fn open(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let mut block = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut block) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(CfbError::NotCompoundFile);
            },
            other => other?,
        }

        let header = RawHeader::read_from_bytes(&block[..])
            .map_err(|_| CfbError::InvalidFormat("Failed to parse header".to_string()))?;

        if &header.magic != MAGIC {
            return Err(CfbError::NotCompoundFile);
        }
        if header.byte_order.get() != 0xFFFE {
            return Err(CfbError::InvalidFormat("Invalid byte order".to_string()));
        }

        let sector_size = match header.sector_shift.get() {
            9 => SECTOR_SIZE_V3,
            12 => SECTOR_SIZE_V4,
            shift => {
                return Err(CfbError::InvalidFormat(format!(
                    "Unsupported sector shift {shift}"
                )));
            },
        };
        if header.mini_sector_shift.get() != 6 {
            return Err(CfbError::InvalidFormat(format!(
                "Unsupported mini sector shift {}",
                header.mini_sector_shift.get()
            )));
        }

        let mut file = CompoundFile {
            reader,
            sector_size,
            mini_sector_size: MINI_SECTOR_SIZE,
            mini_stream_cutoff: header.mini_stream_cutoff.get() as u64,
            fat: Vec::new(),
            minifat: Vec::new(),
            entries: Vec::new(),
            ministream: Vec::new(),
        };

        file.load_fat(&header)?;
        file.load_directory(header.first_dir_sector.get())?;

        let first_minifat = header.first_minifat_sector.get();
        if header.num_minifat_sectors.get() > 0 && first_minifat != ENDOFCHAIN {
            file.load_minifat(first_minifat)?;
        }

        let root = &file.entries[0];
        if root.size > 0 {
            file.ministream = follow_chain(&file.fat, root.start_sector, "FAT")?;
        }

        Ok(file)
    }

    /// Collect the FAT sector IDs from the header and the DIFAT chain, then
    /// read the FAT itself.
    fn load_fat(&mut self, header: &RawHeader) -> Result<()> {
        let num_fat = header.num_fat_sectors.get() as usize;
        let mut fat_sectors: Vec<u32> = header
            .difat
            .iter()
            .map(|id| id.get())
            .take(num_fat.min(HEADER_DIFAT_ENTRIES))
            .filter(|&id| id <= MAXREGSECT)
            .collect();

        let per_difat = self.sector_size / 4 - 1;
        let mut difat_sector = header.first_difat_sector.get();
        for _ in 0..header.num_difat_sectors.get() {
            if fat_sectors.len() >= num_fat || difat_sector > MAXREGSECT {
                break;
            }

            let data = self.read_sector(difat_sector)?;
            let ids = u32_table(&data)?;
            fat_sectors.extend(
                ids[..per_difat]
                    .iter()
                    .copied()
                    .filter(|&id| id <= MAXREGSECT)
                    .take(num_fat - fat_sectors.len()),
            );
            difat_sector = ids[per_difat];
        }

        self.fat.reserve(fat_sectors.len() * self.sector_size / 4);
        for sector in fat_sectors {
            let data = self.read_sector(sector)?;
            self.fat.extend(u32_table(&data)?);
        }

        Ok(())
    }

    fn load_minifat(&mut self, first_sector: u32) -> Result<()> {
        let data = self.read_chain(first_sector)?;
        self.minifat = u32_table(&data)?;
        Ok(())
    }

    fn load_directory(&mut self, first_sector: u32) -> Result<()> {
        let data = self.read_chain(first_sector)?;

        self.entries = data
            .chunks_exact(DIRENTRY_SIZE)
            .enumerate()
            .map(|(sid, raw)| self.parse_directory_entry(raw, sid as u32))
            .collect::<Result<Vec<_>>>()?;

        match self.entries.first() {
            Some(root) if root.kind == EntryKind::Root => Ok(()),
            _ => Err(CfbError::Corrupted("Missing root entry".to_string())),
        }
    }

    fn parse_directory_entry(&self, data: &[u8], sid: u32) -> Result<Entry> {
        let raw = RawDirectoryEntry::read_from_bytes(data)
            .map_err(|_| CfbError::InvalidFormat("Failed to parse directory entry".to_string()))?;

        let kind = EntryKind::from_raw(raw.entry_type);
        let name_len = (raw.name_len.get() as usize).min(64);
        let name = if kind == EntryKind::Empty {
            String::new()
        } else {
            decode_utf16le(&raw.name[..name_len.saturating_sub(2)])
        };

        // Version 3 files only use the low 32 bits of the size
        let size = if self.sector_size == SECTOR_SIZE_V3 {
            raw.stream_size.get() & 0xFFFF_FFFF
        } else {
            raw.stream_size.get()
        };

        Ok(Entry {
            sid,
            name,
            kind,
            clsid: format_clsid(&raw.clsid),
            clsid_bytes: raw.clsid,
            size,
            start_sector: raw.start_sector.get(),
            left: raw.sid_left.get(),
            right: raw.sid_right.get(),
            child: raw.sid_child.get(),
        })
    }

    fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
        let position = (sector as u64 + 1) * self.sector_size as u64;
        self.reader.seek(SeekFrom::Start(position))?;

        let mut buffer = vec![0u8; self.sector_size];
        match self.reader.read_exact(&mut buffer) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CfbError::Corrupted(
                format!("Sector {sector} lies beyond the end of the file"),
            )),
            other => other.map(|_| buffer).map_err(CfbError::from),
        }
    }

    /// Read a whole FAT chain into memory. Only used for metadata streams.
    fn read_chain(&mut self, start_sector: u32) -> Result<Vec<u8>> {
        let chain = follow_chain(&self.fat, start_sector, "FAT")?;
        let mut data = Vec::with_capacity(chain.len() * self.sector_size);
        for sector in chain {
            data.extend_from_slice(&self.read_sector(sector)?);
        }
        Ok(data)
    }

    /// Sector size in bytes (512 or 4096).
    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// The root storage.
    #[inline]
    pub fn root(&self) -> &Entry {
        &self.entries[0]
    }

    /// Entry by storage ID, `None` for unknown or unused slots.
    pub fn entry(&self, sid: u32) -> Option<&Entry> {
        self.entries
            .get(sid as usize)
            .filter(|entry| entry.kind != EntryKind::Empty)
    }

    /// Children of a storage in the order they appear in its sibling tree.
    ///
    /// The tree is walked in order with an explicit stack; entries already
    /// seen are skipped so a malformed tree cannot loop.
    pub fn children(&self, sid: u32) -> Vec<&Entry> {
        let Some(parent) = self.entry(sid).filter(|e| e.kind.is_storage()) else {
            return Vec::new();
        };

        let mut children = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<&Entry> = Vec::new();
        let mut current = parent.child;

        loop {
            while current != NOSTREAM
                && let Some(entry) = self.entry(current)
                && entry.sid != 0
                && seen.insert(current)
            {
                stack.push(entry);
                current = entry.left;
            }

            let Some(entry) = stack.pop() else {
                break;
            };
            children.push(entry);
            current = entry.right;
        }

        children
    }

    /// Find an entry by path. Names are compared case-insensitively, the way
    /// compound files compare them.
    pub fn find(&self, path: &[&str]) -> Option<&Entry> {
        let mut current = self.root();
        for name in path {
            current = self
                .children(current.sid)
                .into_iter()
                .find(|child| names_match(&child.name, name))?;
        }
        Some(current)
    }

    /// Whether a stream is stored in the mini stream.
    fn is_mini(&self, entry: &Entry) -> bool {
        entry.kind == EntryKind::Stream && entry.size < self.mini_stream_cutoff
    }

    /// Absolute file offsets of every sector (or mini sector) of a stream.
    fn unit_offsets(&self, entry: &Entry) -> Result<(Vec<u64>, u64)> {
        let sector = self.sector_size as u64;

        let (mut offsets, unit) = if self.is_mini(entry) {
            let mini = self.mini_sector_size as u64;
            let chain = follow_chain(&self.minifat, entry.start_sector, "MiniFAT")?;
            let offsets = chain
                .iter()
                .map(|&id| {
                    let byte = id as u64 * mini;
                    let host = self.ministream.get((byte / sector) as usize).ok_or_else(|| {
                        CfbError::Corrupted(format!("Mini sector {id} lies outside the mini stream"))
                    })?;
                    Ok((*host as u64 + 1) * sector + byte % sector)
                })
                .collect::<Result<Vec<_>>>()?;
            (offsets, mini)
        } else {
            let chain = follow_chain(&self.fat, entry.start_sector, "FAT")?;
            let offsets = chain.iter().map(|&id| (id as u64 + 1) * sector).collect();
            (offsets, sector)
        };

        let needed = entry.size.div_ceil(unit) as usize;
        if offsets.len() < needed {
            return Err(CfbError::Corrupted(format!(
                "Stream '{}' declares {} bytes but its chain holds only {} bytes",
                entry.name,
                entry.size,
                offsets.len() as u64 * unit
            )));
        }
        offsets.truncate(needed);

        Ok((offsets, unit))
    }

    /// Open a stream for sequential reading.
    pub fn stream_reader(&mut self, sid: u32) -> Result<StreamReader<'_, R>> {
        let entry = self
            .entry(sid)
            .ok_or_else(|| CfbError::EntryNotFound(format!("sid {sid}")))?;
        if entry.kind != EntryKind::Stream {
            return Err(CfbError::InvalidFormat(format!(
                "'{}' is not a stream",
                entry.name
            )));
        }

        let size = entry.size;
        let (offsets, unit) = if size == 0 {
            (Vec::new(), self.sector_size as u64)
        } else {
            self.unit_offsets(entry)?
        };

        Ok(StreamReader {
            reader: &mut self.reader,
            offsets,
            unit,
            size,
            position: 0,
        })
    }

    /// Read a whole stream by path.
    pub fn read_stream(&mut self, path: &[&str]) -> Result<Vec<u8>> {
        let sid = self
            .find(path)
            .ok_or_else(|| CfbError::EntryNotFound(path.join("/")))?
            .sid;
        let mut reader = self.stream_reader(sid)?;
        let mut data = Vec::with_capacity(reader.len() as usize);
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Sequential reader over the sectors of one stream
///
/// Sector offsets are resolved up front, so reading only seeks and copies.
pub struct StreamReader<'a, R> {
    reader: &'a mut R,
    offsets: Vec<u64>,
    unit: u64,
    size: u64,
    position: u64,
}

impl<R> StreamReader<'_, R> {
    /// Declared size of the stream.
    #[inline]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl<R: Read + Seek> Read for StreamReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let index = (self.position / self.unit) as usize;
        let within = self.position % self.unit;
        let available = (self.unit - within).min(self.size - self.position);
        let len = (buf.len() as u64).min(available) as usize;

        self.reader
            .seek(SeekFrom::Start(self.offsets[index] + within))?;
        let read = self.reader.read(&mut buf[..len])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "compound file truncated inside a stream",
            ));
        }

        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for StreamReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.position = target;
        Ok(target)
    }
}

/// Follow a sector chain, refusing cycles and out-of-range links.
fn follow_chain(table: &[u32], start: u32, label: &str) -> Result<Vec<u32>> {
    let mut chain = Vec::new();
    let mut current = start;

    while current != ENDOFCHAIN {
        if current as usize >= table.len() {
            return Err(CfbError::Corrupted(format!(
                "{label} chain points outside the table (sector {current:#x})"
            )));
        }
        if chain.len() >= table.len() {
            return Err(CfbError::Corrupted(format!("Cyclic {label} chain")));
        }
        chain.push(current);
        current = table[current as usize];
    }

    Ok(chain)
}

/// Interpret a sector as an array of little-endian u32.
fn u32_table(data: &[u8]) -> Result<Vec<u32>> {
    <[U32<LE>]>::ref_from_bytes(data)
        .map(|ids| ids.iter().map(|id| id.get()).collect())
        .map_err(|_| CfbError::Corrupted("Sector table is not a whole number of entries".to_string()))
}

/// Compare entry names the way compound files do (case-insensitive).
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_uppercase() == b.to_uppercase()
}

/// Decode UTF-16LE bytes to String
fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}

/// Format a CLSID as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
///
/// Returns `None` for the all-zero (unset) class.
pub fn format_clsid(bytes: &[u8; 16]) -> Option<String> {
    if bytes.iter().all(|&b| b == 0) {
        return None;
    }

    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);

    Some(format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        data1,
        data2,
        data3,
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15],
    ))
}

/// Parse a CLSID string (with or without braces) into its on-disk bytes.
pub fn parse_clsid(text: &str) -> Option<[u8; 16]> {
    let text = text.trim_start_matches('{').trim_end_matches('}');
    let hex: String = text.chars().filter(|&c| c != '-').collect();
    if hex.len() != 32 || text.len() != 36 {
        return None;
    }

    let mut raw = [0u8; 16];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }

    // The first three groups are stored little-endian
    raw[0..4].reverse();
    raw[4..6].reverse();
    raw[6..8].reverse();
    Some(raw)
}

/// Check whether data starts with the compound file signature.
#[inline]
pub fn is_compound_file(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfb::CompoundWriter;
    use std::io::Cursor;

    const WORD_CLSID: &str = "00020906-0000-0000-C000-000000000046";

    fn sample() -> Vec<u8> {
        let mut writer = CompoundWriter::new();
        writer.add_stream(&["WordDocument"], vec![0xAB; 5000]).unwrap();
        writer.add_stream(&["1Table"], b"table".to_vec()).unwrap();
        writer
            .add_storage(&["ObjectPool"], parse_clsid(WORD_CLSID).unwrap())
            .unwrap();
        writer
            .add_stream(&["ObjectPool", "\u{1}Ole10Native"], vec![7; 100])
            .unwrap();
        writer.to_bytes().unwrap()
    }

    #[test]
    fn test_clsid_round_trip() {
        let raw = parse_clsid(WORD_CLSID).unwrap();
        assert_eq!(raw[0..4], [0x06, 0x09, 0x02, 0x00]);
        assert_eq!(format_clsid(&raw).as_deref(), Some(WORD_CLSID));
        assert_eq!(
            parse_clsid("{00020906-0000-0000-C000-000000000046}"),
            Some(raw)
        );
        assert_eq!(format_clsid(&[0; 16]), None);
        assert_eq!(parse_clsid("not-a-clsid"), None);
    }

    #[test]
    fn test_open_and_list() {
        let file = CompoundFile::open(Cursor::new(sample())).unwrap();
        let names: Vec<&str> = file
            .children(0)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"WordDocument"));
        assert!(names.contains(&"1Table"));
        assert!(names.contains(&"ObjectPool"));

        let pool = file.find(&["objectpool"]).unwrap();
        assert_eq!(pool.kind, EntryKind::Storage);
        assert_eq!(pool.clsid.as_deref(), Some(WORD_CLSID));
    }

    #[test]
    fn test_read_regular_and_mini_streams() {
        let mut file = CompoundFile::open(Cursor::new(sample())).unwrap();
        assert_eq!(file.read_stream(&["WordDocument"]).unwrap(), vec![0xAB; 5000]);
        assert_eq!(file.read_stream(&["1Table"]).unwrap(), b"table");
        assert_eq!(
            file.read_stream(&["ObjectPool", "\u{1}Ole10Native"]).unwrap(),
            vec![7; 100]
        );
    }

    #[test]
    fn test_stream_reader_seek() {
        let mut file = CompoundFile::open(Cursor::new(sample())).unwrap();
        let sid = file.find(&["WordDocument"]).unwrap().sid;
        let mut reader = file.stream_reader(sid).unwrap();
        assert_eq!(reader.len(), 5000);

        reader.seek(SeekFrom::End(-4)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, vec![0xAB; 4]);
    }

    #[test]
    fn test_storage_is_not_a_stream() {
        let mut file = CompoundFile::open(Cursor::new(sample())).unwrap();
        let sid = file.find(&["ObjectPool"]).unwrap().sid;
        assert!(matches!(
            file.stream_reader(sid),
            Err(CfbError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_data() {
        assert!(matches!(
            CompoundFile::open(Cursor::new(b"PK\x03\x04 short".to_vec())),
            Err(CfbError::NotCompoundFile)
        ));
        assert!(matches!(
            CompoundFile::open(Cursor::new(vec![0u8; 2048])),
            Err(CfbError::NotCompoundFile)
        ));
    }

    #[test]
    fn test_truncated_stream_is_corrupted() {
        let mut data = sample();
        data.truncate(data.len() - 512);
        // Losing the trailing FAT sector makes the table unreadable
        assert!(CompoundFile::open(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_cyclic_chain_is_detected() {
        let table = vec![1, 0, ENDOFCHAIN];
        assert!(matches!(
            follow_chain(&table, 0, "FAT"),
            Err(CfbError::Corrupted(_))
        ));
        assert_eq!(follow_chain(&table, 2, "FAT").unwrap(), vec![2]);
        assert!(follow_chain(&table, ENDOFCHAIN, "FAT").unwrap().is_empty());
    }

    #[test]
    fn test_is_compound_file() {
        assert!(is_compound_file(MAGIC));
        assert!(!is_compound_file(b"PK\x03\x04"));
    }
}
