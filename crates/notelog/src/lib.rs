//! # Note log
//!
//! Append-only, checksummed log of persisted notes. The store replays it on
//! open to rebuild its indices.
//!
//! ## Frame format (little-endian)
//!
//! ```text
//! ┌───────────────┬─────────────┬──────────────┬──────────────────┐
//! │ record_len u32│ crc32 u32   │ key u64      │ note bytes ...   │
//! └───────────────┴─────────────┴──────────────┴──────────────────┘
//!                  <──────────── record_len ──────────────────────>
//! ```
//!
//! `record_len` counts the crc and the body. The crc covers the body (key
//! and note bytes). A frame cut short at the end of the file is a torn
//! write from a crash and ends replay cleanly; a checksum mismatch is
//! corruption.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// Frames larger than this are treated as corruption rather than allocated.
pub const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

const CRC_LEN: u32 = 4;
const KEY_LEN: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub key: u64,
    pub note: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record at offset {offset}")]
    Corrupt { offset: u64 },
    #[error("note of {0} bytes exceeds the record limit")]
    TooLarge(usize),
}

/// Appends note records and optionally fsyncs after each one.
pub struct NoteLogWriter {
    file: File,
    sync: bool,
}

impl NoteLogWriter {
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self { file, sync })
    }

    /// Appends one note under `key`.
    pub fn append(&mut self, key: u64, note: &[u8]) -> Result<(), LogError> {
        let record_len = u32::try_from(note.len())
            .ok()
            .and_then(|n| n.checked_add(CRC_LEN + KEY_LEN))
            .filter(|&n| n <= MAX_RECORD_LEN)
            .ok_or(LogError::TooLarge(note.len()))?;

        let mut body = Vec::with_capacity(KEY_LEN as usize + note.len());
        body.write_u64::<LittleEndian>(key)?;
        body.extend_from_slice(note);

        let mut hasher = Crc32::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(8 + body.len());
        frame.write_u32::<LittleEndian>(record_len)?;
        frame.write_u32::<LittleEndian>(crc)?;
        frame.extend_from_slice(&body);
        self.file.write_all(&frame)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<(), LogError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Reads note records back in append order.
pub struct NoteLogReader<R: Read> {
    rdr: BufReader<R>,
    offset: u64,
}

impl NoteLogReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<NoteLogReader<File>, LogError> {
        let f = File::open(path)?;
        Ok(NoteLogReader::from_reader(f))
    }
}

/// `Ok(None)` on a clean or torn end of file.
fn read_or_eof<T>(res: io::Result<T>) -> Result<Option<T>, LogError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(LogError::Io(e)),
    }
}

impl<R: Read> NoteLogReader<R> {
    pub fn from_reader(reader: R) -> Self {
        NoteLogReader {
            rdr: BufReader::new(reader),
            offset: 0,
        }
    }

    /// End of the last intact frame read so far. After a replay that hit a
    /// torn tail, the file should be cut back to this length before new
    /// frames are appended.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Feeds every intact record to `apply` and returns how many there were.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<u64, LogError>
    where
        F: FnMut(NoteRecord),
    {
        let mut count = 0;
        loop {
            let start = self.offset;
            let record_len = match read_or_eof(self.rdr.read_u32::<LittleEndian>())? {
                Some(v) => v,
                None => return Ok(count),
            };
            if record_len < CRC_LEN + KEY_LEN || record_len > MAX_RECORD_LEN {
                return Err(LogError::Corrupt { offset: start });
            }

            let Some(crc) = read_or_eof(self.rdr.read_u32::<LittleEndian>())? else {
                warn!(offset = start, "torn note log frame, ignoring tail");
                return Ok(count);
            };
            let mut body = vec![0u8; (record_len - CRC_LEN) as usize];
            if read_or_eof(self.rdr.read_exact(&mut body))?.is_none() {
                warn!(offset = start, "torn note log frame, ignoring tail");
                return Ok(count);
            }

            let mut hasher = Crc32::new();
            hasher.update(&body);
            if hasher.finalize() != crc {
                return Err(LogError::Corrupt { offset: start });
            }

            let mut br = &body[..];
            let key = br.read_u64::<LittleEndian>()?;
            apply(NoteRecord {
                key,
                note: br.to_vec(),
            });

            self.offset = start + 4 + record_len as u64;
            count += 1;
        }
    }
}
