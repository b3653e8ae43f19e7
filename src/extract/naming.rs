//! Output file naming.
//!
//! Outputs are named `<stem>_<seq>.<ext>` with a three-digit sequence number.
//! When the name is taken, `_2`, `_3`, ... is appended to the sequence part.
//! Names are claimed with `create_new`, so two callers writing into the same
//! directory never end up with the same file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on disambiguation attempts per output
const MAX_ATTEMPTS: u32 = 10_000;

/// Name of an output before disambiguation (`attempt` 1) or with the
/// `attempt`-th suffix.
pub(crate) fn candidate_name(stem: &str, seq: u32, attempt: u32, ext: &str) -> String {
    if attempt <= 1 {
        format!("{stem}_{seq:03}.{ext}")
    } else {
        format!("{stem}_{seq:03}_{attempt}.{ext}")
    }
}

/// Hands out output files for one extraction call.
#[derive(Debug)]
pub(crate) struct OutputNamer {
    dest: PathBuf,
    stem: String,
    next_seq: u32,
    dest_ready: bool,
}

impl OutputNamer {
    pub(crate) fn new(dest: &Path, stem: &str) -> Self {
        Self {
            dest: dest.to_path_buf(),
            stem: stem.to_string(),
            next_seq: 1,
            dest_ready: false,
        }
    }

    /// Claim an output name for the current sequence number and create its
    /// (empty) file. The number only moves on with [`commit`](Self::commit),
    /// so a claim whose file is removed again leaves no gap.
    ///
    /// The destination directory is created on the first claim.
    pub(crate) fn claim(&mut self, ext: &str) -> io::Result<(PathBuf, File)> {
        if !self.dest_ready {
            fs::create_dir_all(&self.dest)?;
            self.dest_ready = true;
        }

        let seq = self.next_seq;
        for attempt in 1..=MAX_ATTEMPTS {
            let path = self.dest.join(candidate_name(&self.stem, seq, attempt, ext));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free output name for {}_{seq:03}.{ext}", self.stem),
        ))
    }

    /// Mark the last claimed output as written.
    pub(crate) fn commit(&mut self) {
        self.next_seq += 1;
    }
}
