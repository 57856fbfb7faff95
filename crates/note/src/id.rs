//! Content-addressed note ids.
//!
//! The id is the SHA-256 of the compact JSON array
//! `[0,"<pubkey hex>",<created_at>,<kind>,<tags>,"<content>"]`. The array is
//! streamed straight into the hasher; no intermediate string is built.

use std::io;

use sha2::{Digest, Sha256};

use crate::error::IdError;
use crate::format::{ID_OFFSET, ID_SIZE};
use crate::ser::Commitment;
use crate::view::Note;

struct HashWriter(Sha256);

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Computes the id of `note` from its pubkey, created_at, kind, tags and
/// content. The stored id and sig are not inputs.
pub fn compute_id(note: &Note<'_>) -> Result<[u8; ID_SIZE], IdError> {
    let mut w = HashWriter(Sha256::new());
    serde_json::to_writer(&mut w, &Commitment(*note))?;
    Ok(w.0.finalize().into())
}

/// The exact serialization that [`compute_id`] hashes.
pub fn canonical_json(note: &Note<'_>) -> Result<String, IdError> {
    Ok(serde_json::to_string(&Commitment(*note))?)
}

/// Computes the id of the finalized note in `bytes` and writes it into the
/// note's id field.
pub fn calculate_id(bytes: &mut [u8]) -> Result<[u8; ID_SIZE], IdError> {
    let id = {
        let note = Note::from_bytes(bytes)?;
        compute_id(&note)?
    };
    bytes[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&id);
    Ok(id)
}

/// Checks that the stored id matches the computed one.
pub fn verify_id(note: &Note<'_>) -> Result<(), IdError> {
    let computed = compute_id(note)?;
    if &computed != note.id() {
        return Err(IdError::Mismatch {
            stored: hex::encode(note.id()),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}
