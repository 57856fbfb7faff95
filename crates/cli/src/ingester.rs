//! Ingester workers and the store writer thread.
//!
//! ```text
//!  payloads ──> [inbound queue] ──> ingester × N ──> [writer queue] ──> writer ──> NoteDb
//!                                   parse, verify                      batch, log, index
//! ```
//!
//! Each ingester owns its scratch arena and builds one note at a time in
//! it. The writer is the only thread that takes the store's write lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use note::{event_from_any, verify_id, Note};
use parking_lot::{Condvar, Mutex, RwLock};
use queue::{ProtectedQueue, PushError};
use store::{NoteDb, WriteOutcome};
use tracing::{debug, error, warn};

/// Checks the signature of a parsed note.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, note: &Note<'_>) -> bool;
}

/// Accepts every signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _note: &Note<'_>) -> bool {
        true
    }
}

/// Pipeline counters, plus the number of payloads still in flight.
#[derive(Debug, Default)]
pub struct IngestStats {
    submitted: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    pending: Mutex<u64>,
    idle: Condvar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl IngestStats {
    pub(crate) fn begin(&self) {
        *self.pending.lock() += 1;
    }

    /// Marks a submission that never entered the queue.
    pub(crate) fn abandon(&self) {
        self.finish(1);
    }

    pub(crate) fn accepted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(n);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Blocks until every accepted payload has been stored or rejected.
    pub(crate) fn wait_idle(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.idle.wait(&mut pending);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct Ingester {
    pub(crate) inbound: Arc<ProtectedQueue<String>>,
    pub(crate) writer: Arc<ProtectedQueue<Vec<u8>>>,
    pub(crate) stats: Arc<IngestStats>,
    pub(crate) verifier: Arc<dyn SignatureVerifier>,
    pub(crate) verify_ids: bool,
    pub(crate) scratch: Vec<u8>,
}

impl Ingester {
    /// Processes payloads until the inbound queue is closed and drained.
    pub(crate) fn run(mut self) {
        debug!("ingester started");
        while let Some(payload) = self.inbound.pop() {
            match self.process(&payload) {
                Ok(bytes) => {
                    if let Err(PushError(_)) = self.writer.push(bytes) {
                        error!("writer queue closed, dropping note");
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        self.stats.finish(1);
                    }
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "rejected event");
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    self.stats.finish(1);
                }
            }
        }
        debug!("ingester stopped");
    }

    fn process(&mut self, payload: &str) -> Result<Vec<u8>> {
        let (note, _) = event_from_any(payload, &mut self.scratch).context("parse event")?;
        if self.verify_ids {
            verify_id(&note)?;
        }
        ensure!(
            self.verifier.verify(&note),
            "bad signature on {}",
            hex::encode(note.id())
        );
        Ok(note.to_vec())
    }
}

/// Drains the writer queue into the store in batches of at most `batch`.
pub(crate) fn run_writer(
    queue: Arc<ProtectedQueue<Vec<u8>>>,
    db: Arc<RwLock<NoteDb>>,
    stats: Arc<IngestStats>,
    batch: usize,
) {
    debug!("writer started");
    let mut pending = Vec::with_capacity(batch);
    while queue.pop_batch(&mut pending, batch) > 0 {
        let done = pending.len() as u64;
        {
            let mut db = db.write();
            for bytes in pending.drain(..) {
                let outcome = Note::from_bytes(&bytes)
                    .map_err(anyhow::Error::from)
                    .and_then(|note| Ok(db.write_note(&note)?));
                match outcome {
                    Ok(WriteOutcome::Stored(_)) => {
                        stats.stored.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(WriteOutcome::Duplicate(key)) => {
                        debug!(key, "duplicate note");
                        stats.duplicates.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to store note");
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        stats.finish(done);
    }
    debug!("writer stopped");
}
