//! Ingestion engine tying the queues, the ingester pool and the note store
//! together.

use anyhow::{anyhow, bail, Context, Result};
use note::ID_SIZE;
use parking_lot::{RwLock, RwLockReadGuard};
use queue::{ProtectedQueue, PushError, TryPushError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use store::{NoteDb, ProfileRecord};
use tracing::{error, info};

use crate::config::Config;
use crate::ingester::{run_writer, AcceptAll, IngestStats, Ingester, SignatureVerifier, StatsSnapshot};

/// A running note database with its ingestion pipeline.
///
/// # Write Path
///
/// 1. A raw JSON payload is pushed to the inbound queue (blocking or not).
/// 2. An ingester parses it into its scratch arena, checks the id and the
///    signature, and copies the finished note to the writer queue.
/// 3. The writer takes batches off the writer queue, appends each note to
///    the note log and indexes it.
///
/// # Read Path
///
/// Lookups take the store's read lock; they never wait on ingestion.
///
/// # Shutdown
///
/// [`Ndb::close`] (or dropping the `Ndb`) closes the inbound queue, joins the
/// ingesters once they drained it, then closes the writer queue and joins
/// the writer. Every payload accepted before shutdown is processed.
pub struct Ndb {
    inbound: Arc<ProtectedQueue<String>>,
    writer_queue: Arc<ProtectedQueue<Vec<u8>>>,
    db: Arc<RwLock<NoteDb>>,
    stats: Arc<IngestStats>,
    ingesters: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Ndb {
    /// Opens the store in `config.db_dir` and starts the pipeline. Every
    /// signature is accepted.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_verifier(config, Arc::new(AcceptAll))
    }

    /// Like [`Ndb::open`], with a custom signature check.
    pub fn open_with_verifier(
        config: Config,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        config.validate()?;

        let db = NoteDb::open(&config.db_dir, config.log_sync)
            .with_context(|| format!("open note store in {}", config.db_dir.display()))?;
        let db = Arc::new(RwLock::new(db));
        let inbound = Arc::new(ProtectedQueue::new(config.queue_capacity)?);
        let writer_queue = Arc::new(ProtectedQueue::new(config.writer_queue_capacity)?);
        let stats = Arc::new(IngestStats::default());

        let writer = {
            let queue = Arc::clone(&writer_queue);
            let db = Arc::clone(&db);
            let stats = Arc::clone(&stats);
            let batch = config.writer_batch;
            thread::Builder::new()
                .name("notedb-writer".into())
                .spawn(move || run_writer(queue, db, stats, batch))?
        };

        let mut ndb = Self {
            inbound,
            writer_queue,
            db,
            stats,
            ingesters: Vec::with_capacity(config.ingester_threads),
            writer: Some(writer),
        };

        for i in 0..config.ingester_threads {
            let ingester = Ingester {
                inbound: Arc::clone(&ndb.inbound),
                writer: Arc::clone(&ndb.writer_queue),
                stats: Arc::clone(&ndb.stats),
                verifier: Arc::clone(&verifier),
                verify_ids: config.verify_ids,
                scratch: vec![0u8; config.scratch_size],
            };
            // on failure, Drop stops the threads already started
            let handle = thread::Builder::new()
                .name(format!("notedb-ingester-{i}"))
                .spawn(move || ingester.run())?;
            ndb.ingesters.push(handle);
        }

        info!(
            dir = %config.db_dir.display(),
            threads = config.ingester_threads,
            "pipeline started"
        );
        Ok(ndb)
    }

    /// Submits one payload, waiting while the inbound queue is full.
    pub fn process_event(&self, json: &str) -> Result<()> {
        self.stats.begin();
        if let Err(PushError(_)) = self.inbound.push(json.to_owned()) {
            self.stats.abandon();
            bail!("pipeline is shut down");
        }
        self.stats.accepted();
        Ok(())
    }

    /// Submits one payload if the inbound queue has room; otherwise hands it
    /// back as [`TryPushError::Full`].
    pub fn try_process_event(&self, json: &str) -> Result<(), TryPushError<String>> {
        self.stats.begin();
        match self.inbound.try_push(json.to_owned()) {
            Ok(()) => {
                self.stats.accepted();
                Ok(())
            }
            Err(e) => {
                self.stats.abandon();
                Err(e)
            }
        }
    }

    /// Submits every non-empty line of `ldjson`, returning how many.
    pub fn process_events(&self, ldjson: &str) -> Result<usize> {
        let mut n = 0;
        for line in ldjson.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.process_event(line)?;
            n += 1;
        }
        Ok(n)
    }

    /// Waits until every payload submitted so far has been stored or
    /// rejected.
    pub fn flush(&self) {
        self.stats.wait_idle();
    }

    /// Read access to the store for zero-copy lookups.
    pub fn read(&self) -> RwLockReadGuard<'_, NoteDb> {
        self.db.read()
    }

    pub fn get_note_by_id(&self, id: &[u8; ID_SIZE]) -> Option<Vec<u8>> {
        self.db.read().note_by_id(id).map(|n| n.to_vec())
    }

    pub fn get_note_by_key(&self, key: u64) -> Option<Vec<u8>> {
        self.db.read().note_by_key(key).map(|n| n.to_vec())
    }

    pub fn get_profile_by_pubkey(&self, pubkey: &[u8; ID_SIZE]) -> Option<ProfileRecord> {
        self.db.read().profile_by_pubkey(pubkey)
    }

    pub fn notes_by_author(&self, pubkey: &[u8; ID_SIZE]) -> Vec<u64> {
        self.db.read().notes_by_author(pubkey).to_vec()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the pipeline after draining it.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let mut panicked = 0;

        self.inbound.close();
        for handle in self.ingesters.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        self.writer_queue.close();
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                panicked += 1;
            }
            self.db.write().sync()?;
            info!(stats = ?self.stats.snapshot(), "pipeline stopped");
        }

        if panicked > 0 {
            return Err(anyhow!("{panicked} pipeline thread(s) panicked"));
        }
        Ok(())
    }
}

impl Drop for Ndb {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "pipeline shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use note::{calculate_id, note_to_json, Note, NoteBuilder, KIND_PROFILE};
    use tempfile::tempdir;

    // ---------------------- Helpers ----------------------

    fn event(pubkey: u8, kind: u32, created_at: u64, content: &str) -> (String, [u8; ID_SIZE]) {
        let mut buf = vec![0u8; 4096];
        let size = {
            let mut b = NoteBuilder::new(&mut buf).unwrap();
            b.set_pubkey(&[pubkey; ID_SIZE]);
            b.set_sig(&[0xab; 64]);
            b.set_kind(kind);
            b.set_created_at(created_at);
            b.set_content(content).unwrap();
            b.new_tag().unwrap();
            b.push_tag_str("t").unwrap();
            b.push_tag_str("pipeline").unwrap();
            b.finalize().unwrap().1
        };
        let id = calculate_id(&mut buf[..size]).unwrap();
        let json = note_to_json(&Note::from_bytes(&buf[..size]).unwrap()).unwrap();
        (json, id)
    }

    fn config(dir: &std::path::Path) -> Config {
        Config::new(dir)
            .with_ingester_threads(2)
            .with_queue_capacity(8)
            .with_writer_queue_capacity(8)
            .with_writer_batch(4)
            .with_scratch_size(64 * 1024)
    }

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _note: &Note<'_>) -> bool {
            false
        }
    }

    // ---------------------- Ingest and query ----------------------

    #[test]
    fn processed_event_is_queryable() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (json, id) = event(1, 1, 100, "hello");
        ndb.process_event(&json)?;
        ndb.flush();

        let bytes = ndb.get_note_by_id(&id).unwrap();
        let note = Note::from_bytes(&bytes)?;
        assert_eq!(note.content_str(), Some("hello"));
        assert_eq!(note.tag_count(), 1);
        assert_eq!(ndb.get_note_by_key(1), Some(bytes));
        assert_eq!(ndb.notes_by_author(&[1; ID_SIZE]), vec![1]);

        let stats = ndb.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.stored, 1);
        ndb.close()
    }

    #[test]
    fn all_envelope_shapes_are_ingested() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (a, id_a) = event(1, 1, 1, "bare");
        let (b, id_b) = event(1, 1, 2, "client");
        let (c, id_c) = event(1, 1, 3, "relay");
        ndb.process_event(&a)?;
        ndb.process_event(&format!(r#"["EVENT",{b}]"#))?;
        ndb.process_event(&format!(r#"["EVENT","sub",{c}]"#))?;
        ndb.flush();

        for id in [id_a, id_b, id_c] {
            assert!(ndb.get_note_by_id(&id).is_some());
        }
        ndb.close()
    }

    #[test]
    fn malformed_event_is_rejected_and_pipeline_continues() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (good, id) = event(1, 1, 100, "after junk");
        ndb.process_event(r#"["EVENT""{"content""#)?;
        ndb.process_event("not json at all")?;
        ndb.process_event(&good)?;
        ndb.flush();

        let stats = ndb.stats();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.stored, 1);
        assert!(ndb.get_note_by_id(&id).is_some());
        ndb.close()
    }

    #[test]
    fn id_mismatch_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (json, id) = event(1, 1, 100, "original");
        let tampered = json.replace("original", "tampered");
        ndb.process_event(&tampered)?;
        ndb.flush();

        assert_eq!(ndb.stats().rejected, 1);
        assert!(ndb.get_note_by_id(&id).is_none());
        ndb.close()
    }

    #[test]
    fn id_check_can_be_disabled() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()).with_verify_ids(false))?;

        let (json, id) = event(1, 1, 100, "original");
        ndb.process_event(&json.replace("original", "tampered"))?;
        ndb.flush();

        assert_eq!(ndb.stats().stored, 1);
        let bytes = ndb.get_note_by_id(&id).unwrap();
        assert_eq!(Note::from_bytes(&bytes)?.content_str(), Some("tampered"));
        ndb.close()
    }

    #[test]
    fn failing_signature_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open_with_verifier(config(dir.path()), Arc::new(RejectAll))?;

        let (json, _) = event(1, 1, 100, "unsigned");
        ndb.process_event(&json)?;
        ndb.flush();

        assert_eq!(ndb.stats().rejected, 1);
        assert_eq!(ndb.stats().stored, 0);
        ndb.close()
    }

    #[test]
    fn duplicates_are_counted_once_stored() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (json, _) = event(1, 1, 100, "same");
        for _ in 0..3 {
            ndb.process_event(&json)?;
        }
        ndb.flush();

        let stats = ndb.stats();
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(ndb.read().len(), 1);
        ndb.close()
    }

    #[test]
    fn profile_lookup_returns_newest() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (old, _) = event(5, KIND_PROFILE, 100, r#"{"name":"old"}"#);
        let (new, _) = event(5, KIND_PROFILE, 200, r#"{"name":"new"}"#);
        ndb.process_event(&new)?;
        ndb.process_event(&old)?;
        ndb.flush();

        let profile = ndb.get_profile_by_pubkey(&[5; ID_SIZE]).unwrap();
        assert_eq!(profile.created_at, 200);
        assert_eq!(profile.record, br#"{"name":"new"}"#);
        ndb.close()
    }

    #[test]
    fn process_events_splits_lines() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let lines: Vec<String> = (0..50).map(|i| event(2, 1, i, &format!("n{i}")).0).collect();
        let ldjson = format!("{}\n\n", lines.join("\n"));
        assert_eq!(ndb.process_events(&ldjson)?, 50);
        ndb.flush();

        assert_eq!(ndb.stats().stored, 50);
        assert_eq!(ndb.notes_by_author(&[2; ID_SIZE]).len(), 50);
        ndb.close()
    }

    #[test]
    fn try_process_event_accepts_when_room() -> Result<()> {
        let dir = tempdir()?;
        let ndb = Ndb::open(config(dir.path()))?;

        let (json, id) = event(1, 1, 1, "non-blocking");
        ndb.try_process_event(&json)
            .map_err(|e| anyhow!("submit failed: {e}"))?;
        ndb.flush();
        assert!(ndb.get_note_by_id(&id).is_some());
        ndb.close()
    }

    // ---------------------- Shutdown and recovery ----------------------

    #[test]
    fn close_drains_accepted_payloads() -> Result<()> {
        let dir = tempdir()?;
        let ids: Vec<_> = {
            let ndb = Ndb::open(config(dir.path()))?;
            let mut ids = Vec::new();
            for i in 0..20 {
                let (json, id) = event(3, 1, i, &format!("drain {i}"));
                ndb.process_event(&json)?;
                ids.push(id);
            }
            ndb.close()?;
            ids
        };

        let ndb = Ndb::open(config(dir.path()))?;
        for id in &ids {
            assert!(ndb.get_note_by_id(id).is_some());
        }
        assert_eq!(ndb.read().last_key(), 20);
        ndb.close()
    }

    #[test]
    fn drop_stops_pipeline() -> Result<()> {
        let dir = tempdir()?;
        let (json, id) = event(1, 1, 1, "dropped");
        {
            let ndb = Ndb::open(config(dir.path()))?;
            ndb.process_event(&json)?;
        }
        let ndb = Ndb::open(config(dir.path()))?;
        assert!(ndb.get_note_by_id(&id).is_some());
        ndb.close()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(Ndb::open(config(dir.path()).with_ingester_threads(0)).is_err());
    }
}
