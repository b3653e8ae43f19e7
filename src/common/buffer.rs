//! Temp-file backed byte buffer.
//!
//! Embedded objects range from a few bytes to hundreds of megabytes. A
//! [`SpillBuffer`] behaves like an in-memory byte sequence (read, write,
//! seek, convert to `Vec<u8>` on demand) but keeps its content in a named
//! temporary file, so peak memory stays constant regardless of payload size.
//!
//! The backing file belongs exclusively to the buffer and is removed when the
//! buffer is dropped or [released](SpillBuffer::release), on every exit path.
//! Removal is best effort: a file that is already gone is not an error.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Prefix of every backing file, handy when inspecting a temp directory.
const SPILL_PREFIX: &str = "embex-";

/// Chunk size used by the lazy byte iterator.
const CHUNK_SIZE: usize = 8 * 1024;

/// Most memory reserved up front by `to_bytes`; larger content grows the
/// vector as it is read.
const MAX_PREALLOC: u64 = 1 << 20;

/// Disposable, temp-file backed byte buffer.
///
/// Reading and writing share a single cursor, exactly like a file handle.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
/// use embex::SpillBuffer;
///
/// let mut buffer = SpillBuffer::new()?;
/// buffer.write_all(b"hello")?;
/// buffer.rewind()?;
///
/// assert_eq!(buffer.len()?, 5);
/// assert_eq!(buffer.read_byte()?, Some(b'h'));
/// assert_eq!(buffer.to_bytes()?, b"hello");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct SpillBuffer {
    file: NamedTempFile,
}

impl SpillBuffer {
    /// Create an empty buffer in the system temp directory.
    pub fn new() -> io::Result<Self> {
        Self::new_in(None)
    }

    /// Create an empty buffer, optionally inside `dir` instead of the system
    /// temp directory.
    pub fn new_in(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SPILL_PREFIX).suffix(".spill");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(Self { file })
    }

    /// Copy everything remaining in `reader` into a new buffer.
    ///
    /// The reader is consumed. The buffer's cursor is left at 0.
    pub fn from_reader<R: Read>(reader: R) -> io::Result<Self> {
        Self::from_reader_in(None, reader)
    }

    /// Same as [`from_reader`](Self::from_reader) with an explicit temp
    /// directory.
    pub fn from_reader_in<R: Read>(dir: Option<&Path>, mut reader: R) -> io::Result<Self> {
        let mut buffer = Self::new_in(dir)?;
        io::copy(&mut reader, &mut buffer.file)?;
        buffer.rewind()?;
        Ok(buffer)
    }

    /// Copy the whole content of a seekable source, from offset 0, into a new
    /// buffer and restore the source's read position afterwards.
    pub fn from_seekable<R: Read + Seek>(reader: &mut R) -> io::Result<Self> {
        let position = reader.stream_position()?;
        reader.seek(SeekFrom::Start(0))?;

        let mut buffer = Self::new()?;
        let copied = io::copy(reader, &mut buffer.file);
        // Restore even when the copy failed half-way.
        reader.seek(SeekFrom::Start(position))?;
        copied?;

        buffer.rewind()?;
        Ok(buffer)
    }

    /// Create a buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut buffer = Self::new()?;
        buffer.file.write_all(data)?;
        buffer.rewind()?;
        Ok(buffer)
    }

    /// Total number of bytes in the buffer.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    /// Whether the buffer holds no bytes at all.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Current cursor position.
    pub fn position(&self) -> io::Result<u64> {
        let mut file = self.file.as_file();
        file.stream_position()
    }

    /// Move the cursor to an absolute position.
    pub fn set_position(&mut self, position: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(position)).map(|_| ())
    }

    /// Move the cursor back to the start.
    #[inline]
    pub fn rewind(&mut self) -> io::Result<()> {
        self.set_position(0)
    }

    /// Read a single byte at the cursor, `None` at the end of the buffer.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.file.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Lazy iterator over the bytes from the cursor to the end.
    ///
    /// The sequence is finite. To iterate again, [`rewind`](Self::rewind)
    /// first. When the iterator is dropped the cursor sits right after the
    /// last byte it yielded.
    pub fn iter_bytes(&mut self) -> Bytes<'_> {
        let logical = self.position().unwrap_or(0);
        Bytes {
            buffer: self,
            chunk: Vec::with_capacity(CHUNK_SIZE),
            index: 0,
            logical,
            done: false,
        }
    }

    /// Read the whole content into memory. The cursor is preserved.
    pub fn to_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len()?.min(MAX_PREALLOC) as usize);
        self.persist_to(&mut data)?;
        Ok(data)
    }

    /// Read up to `len` bytes from the start of the buffer. The cursor is
    /// preserved.
    pub fn peek(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let position = self.position()?;
        self.rewind()?;
        let mut prefix = Vec::with_capacity(len);
        let read = (&mut self.file).take(len as u64).read_to_end(&mut prefix);
        self.set_position(position)?;
        read?;
        Ok(prefix)
    }

    /// Copy the whole content into `out`. The cursor is preserved.
    pub fn persist_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<u64> {
        let position = self.position()?;
        self.rewind()?;
        let copied = io::copy(&mut self.file, out);
        self.set_position(position)?;
        copied
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Release the buffer now and delete its backing file.
    ///
    /// Equivalent to dropping it; a failed removal is swallowed.
    pub fn release(self) {
        let _ = self.file.close();
    }
}

impl Read for SpillBuffer {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SpillBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for SpillBuffer {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Lazy byte iterator returned by [`SpillBuffer::bytes`].
///
/// Reads the backing file in chunks; the cursor is put back to the logical
/// position when the iterator is dropped.
pub struct Bytes<'a> {
    buffer: &'a mut SpillBuffer,
    chunk: Vec<u8>,
    index: usize,
    logical: u64,
    done: bool,
}

impl Iterator for Bytes<'_> {
    type Item = io::Result<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.index == self.chunk.len() {
            self.chunk.clear();
            self.index = 0;
            let read = (&mut self.buffer.file)
                .take(CHUNK_SIZE as u64)
                .read_to_end(&mut self.chunk);
            match read {
                Ok(0) => {
                    self.done = true;
                    return None;
                },
                Ok(_) => {},
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            }
        }

        let byte = self.chunk[self.index];
        self.index += 1;
        self.logical += 1;
        Some(Ok(byte))
    }
}

impl Drop for Bytes<'_> {
    fn drop(&mut self) {
        let _ = self.buffer.set_position(self.logical);
    }
}
