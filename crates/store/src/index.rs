//! # Note index
//!
//! In-memory indices over the persisted notes, rebuilt from the note log on
//! every open.
//!
//! ## Key properties
//! - **Key order**: notes are kept in a `BTreeMap` by note key, so iteration
//!   follows insertion order.
//! - **One note per id**: a second note with a known id is not inserted.
//! - **Created-at gated profiles**: a kind-0 note replaces the profile of its
//!   author only when strictly newer; older or equal writes are ignored.
//! - **Approximate size tracking**: total bytes of the stored notes.

use std::collections::{BTreeMap, HashMap};

use note::{Note, ID_SIZE, KIND_PROFILE};

pub type Id = [u8; ID_SIZE];

/// The note currently serving as an author's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileEntry {
    pub created_at: u64,
    pub note_key: u64,
}

#[derive(Debug, Default)]
pub struct NoteIndex {
    notes: BTreeMap<u64, Vec<u8>>,
    ids: HashMap<Id, u64>,
    profiles: HashMap<Id, ProfileEntry>,
    authors: HashMap<Id, Vec<u64>>,
    approx_size: usize,
    last_key: u64,
}

impl NoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `bytes` (the serialized form of `note`) under `key`.
    ///
    /// Returns `false` and changes nothing if the id is already indexed.
    pub fn insert(&mut self, key: u64, note: &Note<'_>, bytes: Vec<u8>) -> bool {
        if self.ids.contains_key(note.id()) {
            return false;
        }

        self.ids.insert(*note.id(), key);
        self.authors.entry(*note.pubkey()).or_default().push(key);
        if note.kind() == KIND_PROFILE {
            self.update_profile(*note.pubkey(), note.created_at(), key);
        }

        self.approx_size = self.approx_size.saturating_add(bytes.len());
        self.last_key = self.last_key.max(key);
        self.notes.insert(key, bytes);
        true
    }

    fn update_profile(&mut self, pubkey: Id, created_at: u64, note_key: u64) {
        match self.profiles.get(&pubkey) {
            Some(old) if old.created_at >= created_at => {}
            _ => {
                self.profiles.insert(
                    pubkey,
                    ProfileEntry {
                        created_at,
                        note_key,
                    },
                );
            }
        }
    }

    pub fn get(&self, key: u64) -> Option<&[u8]> {
        self.notes.get(&key).map(Vec::as_slice)
    }

    pub fn key_for_id(&self, id: &Id) -> Option<u64> {
        self.ids.get(id).copied()
    }

    pub fn profile(&self, pubkey: &Id) -> Option<ProfileEntry> {
        self.profiles.get(pubkey).copied()
    }

    /// Keys of every note by `pubkey`, oldest first.
    pub fn author_keys(&self, pubkey: &Id) -> &[u64] {
        self.authors.get(pubkey).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Highest key indexed so far, 0 when empty.
    pub fn last_key(&self) -> u64 {
        self.last_key
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }
}
