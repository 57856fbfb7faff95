//! Pipeline configuration.

use std::path::PathBuf;

use anyhow::{ensure, Result};

/// Default scratch arena per ingester (2 MiB).
pub const DEFAULT_SCRATCH_SIZE: usize = 2 * 1024 * 1024;

/// Smallest accepted scratch arena.
pub const MIN_SCRATCH_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the note log.
    pub db_dir: PathBuf,
    /// Number of ingester threads.
    pub ingester_threads: usize,
    /// Capacity of the inbound payload queue.
    pub queue_capacity: usize,
    /// Capacity of the queue between ingesters and the writer.
    pub writer_queue_capacity: usize,
    /// Most notes the writer takes per store lock.
    pub writer_batch: usize,
    /// Scratch arena size per ingester; bounds the largest accepted note.
    pub scratch_size: usize,
    /// fsync the note log after every append.
    pub log_sync: bool,
    /// Reject notes whose stored id does not match the computed one.
    pub verify_ids: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("notedb"),
            ingester_threads: 2,
            queue_capacity: 4096,
            writer_queue_capacity: 4096,
            writer_batch: 256,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            log_sync: false,
            verify_ids: true,
        }
    }
}

impl Config {
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self::default().with_db_dir(db_dir)
    }

    pub fn with_db_dir(mut self, db_dir: impl Into<PathBuf>) -> Self {
        self.db_dir = db_dir.into();
        self
    }

    pub fn with_ingester_threads(mut self, threads: usize) -> Self {
        self.ingester_threads = threads;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_writer_queue_capacity(mut self, capacity: usize) -> Self {
        self.writer_queue_capacity = capacity;
        self
    }

    pub fn with_writer_batch(mut self, batch: usize) -> Self {
        self.writer_batch = batch;
        self
    }

    pub fn with_scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = size;
        self
    }

    pub fn with_log_sync(mut self, sync: bool) -> Self {
        self.log_sync = sync;
        self
    }

    pub fn with_verify_ids(mut self, verify: bool) -> Self {
        self.verify_ids = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.ingester_threads > 0, "ingester_threads must be at least 1");
        ensure!(self.queue_capacity > 0, "queue_capacity must be at least 1");
        ensure!(
            self.writer_queue_capacity > 0,
            "writer_queue_capacity must be at least 1"
        );
        ensure!(self.writer_batch > 0, "writer_batch must be at least 1");
        ensure!(
            self.scratch_size >= MIN_SCRATCH_SIZE,
            "scratch_size must be at least {MIN_SCRATCH_SIZE} bytes"
        );
        Ok(())
    }
}
