/// Compound File Binary (OLE2 / MS-CFB) support.
///
/// A compound file is a small file system inside a file: fixed-size sectors
/// chained through a FAT, a directory of storages (folders) and streams
/// (files), and a mini stream holding everything smaller than 4 KiB.
///
/// - [`CompoundFile`] reads the structure and streams any entry through a
///   [`StreamReader`] without materializing it
/// - [`CompoundWriter`] produces a standalone version 3 file, used to export
///   an embedded storage with its whole subtree
pub mod consts;
pub mod error;
pub mod file;
pub mod writer;

pub use error::{CfbError, Result};
pub use file::{CompoundFile, Entry, EntryKind, StreamReader, format_clsid, is_compound_file, parse_clsid};
pub use writer::CompoundWriter;
