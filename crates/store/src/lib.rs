//! # Note store
//!
//! Durable note storage: every accepted note is appended to the note log
//! and then indexed in memory.
//!
//! ## Write path
//!
//! 1. Look the id up; a known id is reported as a duplicate.
//! 2. Assign the next note key.
//! 3. Append `(key, note bytes)` to the note log.
//! 4. Index the note (id, author, profile).
//!
//! ## Recovery
//!
//! [`NoteDb::open`] replays `notes.log` from the start. Each record is
//! validated as a note before it is indexed. A frame torn by a crash is cut
//! off so new frames follow the last intact one.

mod index;

pub use index::{Id, NoteIndex, ProfileEntry};

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use note::{Note, NoteError};
use notelog::{LogError, NoteLogReader, NoteLogWriter};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const LOG_FILE: &str = "notes.log";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("note log: {0}")]
    Log(#[from] LogError),
    #[error("invalid note under key {key}: {source}")]
    Note { key: u64, source: NoteError },
    #[error("no note store at {}", .0.display())]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored(u64),
    Duplicate(u64),
}

impl WriteOutcome {
    pub fn key(&self) -> u64 {
        match *self {
            WriteOutcome::Stored(k) | WriteOutcome::Duplicate(k) => k,
        }
    }
}

/// The profile of a pubkey: the newest kind-0 note and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub note_key: u64,
    pub created_at: u64,
    pub record: Vec<u8>,
}

pub struct NoteDb {
    index: NoteIndex,
    log: NoteLogWriter,
}

impl NoteDb {
    /// Opens (or creates) the store in `dir`, replaying its note log.
    ///
    /// `sync` makes every log append fsync.
    pub fn open<P: AsRef<Path>>(dir: P, sync: bool) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);

        let mut index = NoteIndex::new();
        if path.exists() {
            let mut invalid = None;
            let mut reader = NoteLogReader::open(&path)?;
            let records = reader.replay(|r| {
                if invalid.is_some() {
                    return;
                }
                match Note::from_bytes(&r.note) {
                    Ok(note) => {
                        let note_bytes = r.note.clone();
                        index.insert(r.key, &note, note_bytes);
                    }
                    Err(source) => invalid = Some(StoreError::Note { key: r.key, source }),
                }
            })?;
            if let Some(err) = invalid {
                return Err(err);
            }
            info!(
                records,
                notes = index.len(),
                bytes = index.approx_size(),
                "note log replayed"
            );

            let intact = reader.offset();
            let file = OpenOptions::new().write(true).open(&path)?;
            let len = file.metadata()?.len();
            if len > intact {
                warn!(len, intact, "truncating torn note log tail");
                file.set_len(intact)?;
                file.sync_all()?;
            }
        }

        let log = NoteLogWriter::create(&path, sync)?;
        info!(dir = %dir.display(), last_key = index.last_key(), "note store opened");
        Ok(Self { index, log })
    }

    /// Like [`open`](NoteDb::open), but fails instead of creating a store
    /// that does not exist yet.
    pub fn open_existing<P: AsRef<Path>>(dir: P, sync: bool) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        if !dir.join(LOG_FILE).is_file() {
            return Err(StoreError::NotFound(dir.to_path_buf()));
        }
        Self::open(dir, sync)
    }

    /// Persists `note` unless a note with the same id is already stored.
    pub fn write_note(&mut self, note: &Note<'_>) -> Result<WriteOutcome, StoreError> {
        if let Some(key) = self.index.key_for_id(note.id()) {
            return Ok(WriteOutcome::Duplicate(key));
        }

        let key = self.index.last_key().saturating_add(1);
        let bytes = note.to_vec();
        self.log.append(key, &bytes)?;
        self.index.insert(key, note, bytes);

        debug!(key, kind = note.kind(), id = %hex::encode(note.id()), "stored note");
        Ok(WriteOutcome::Stored(key))
    }

    pub fn note_by_key(&self, key: u64) -> Option<Note<'_>> {
        self.index.get(key).and_then(|b| Note::from_bytes(b).ok())
    }

    pub fn note_by_id(&self, id: &Id) -> Option<Note<'_>> {
        self.index.key_for_id(id).and_then(|k| self.note_by_key(k))
    }

    pub fn profile_by_pubkey(&self, pubkey: &Id) -> Option<ProfileRecord> {
        let entry = self.index.profile(pubkey)?;
        let note = self.note_by_key(entry.note_key)?;
        Some(ProfileRecord {
            note_key: entry.note_key,
            created_at: entry.created_at,
            record: note.content().to_vec(),
        })
    }

    /// Keys of every note by `pubkey`, in the order they were stored.
    pub fn notes_by_author(&self, pubkey: &Id) -> &[u64] {
        self.index.author_keys(pubkey)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn last_key(&self) -> u64 {
        self.index.last_key()
    }

    pub fn sync(&mut self) -> Result<(), StoreError> {
        Ok(self.log.sync()?)
    }
}
