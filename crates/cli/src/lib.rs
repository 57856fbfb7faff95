//! # notedb
//!
//! Embedded note database: a pool of ingester threads turns raw JSON events
//! into packed notes and a single writer persists them to the note store.

pub mod config;
pub mod engine;
pub mod ingester;
pub mod logging;

pub use config::Config;
pub use engine::Ndb;
pub use ingester::{AcceptAll, SignatureVerifier, StatsSnapshot};
