//! notedb CLI - import events and query the note store.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use note::{note_to_json, Note, ID_SIZE};
use notedb::{logging, Config, Ndb};
use store::NoteDb;
use tracing::info;

/// Embedded note database.
#[derive(Parser)]
#[command(name = "notedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Database directory
    #[arg(long, global = true, default_value = "notedb")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import line-delimited JSON events (bare or wrapped in EVENT messages)
    Import {
        /// Path to the events file
        file: PathBuf,

        /// Number of ingester threads
        #[arg(short, long, default_value_t = 2)]
        threads: usize,

        /// fsync the note log after every note
        #[arg(long)]
        sync: bool,

        /// Skip the id check
        #[arg(long)]
        no_verify: bool,
    },

    /// Print a note by id
    Note {
        /// Note id (64 hex characters)
        id: String,
    },

    /// Print a note by note key
    Key {
        key: u64,
    },

    /// Print the profile record of a pubkey
    Profile {
        /// Pubkey (64 hex characters)
        pubkey: String,
    },

    /// List the note keys of an author
    Author {
        /// Pubkey (64 hex characters)
        pubkey: String,
    },
}

fn parse_id(text: &str) -> Result<[u8; ID_SIZE]> {
    let mut id = [0u8; ID_SIZE];
    hex::decode_to_slice(text, &mut id).with_context(|| format!("invalid hex id `{text}`"))?;
    Ok(id)
}

fn print_note(note: Option<Note<'_>>) -> Result<()> {
    match note {
        Some(note) => {
            println!("{}", note_to_json(&note)?);
            Ok(())
        }
        None => bail!("note not found"),
    }
}

fn import(db: PathBuf, file: PathBuf, threads: usize, sync: bool, no_verify: bool) -> Result<()> {
    let text =
        fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;

    let config = Config::new(db)
        .with_ingester_threads(threads)
        .with_log_sync(sync)
        .with_verify_ids(!no_verify);
    let ndb = Ndb::open(config)?;

    let submitted = ndb.process_events(&text)?;
    ndb.flush();
    let stats = ndb.stats();
    ndb.close()?;

    info!(submitted, "import finished");
    println!(
        "submitted {} stored {} duplicates {} rejected {} failed {}",
        stats.submitted, stats.stored, stats.duplicates, stats.rejected, stats.failed
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Commands::Import {
            file,
            threads,
            sync,
            no_verify,
        } => import(cli.db, file, threads, sync, no_verify),

        Commands::Note { id } => {
            let id = parse_id(&id)?;
            let db = NoteDb::open_existing(&cli.db, false)?;
            print_note(db.note_by_id(&id))
        }

        Commands::Key { key } => {
            let db = NoteDb::open_existing(&cli.db, false)?;
            print_note(db.note_by_key(key))
        }

        Commands::Profile { pubkey } => {
            let pubkey = parse_id(&pubkey)?;
            let db = NoteDb::open_existing(&cli.db, false)?;
            match db.profile_by_pubkey(&pubkey) {
                Some(profile) => {
                    println!("{}", String::from_utf8_lossy(&profile.record));
                    Ok(())
                }
                None => bail!("no profile for {}", hex::encode(pubkey)),
            }
        }

        Commands::Author { pubkey } => {
            let pubkey = parse_id(&pubkey)?;
            let db = NoteDb::open_existing(&cli.db, false)?;
            for key in db.notes_by_author(&pubkey) {
                println!("{key}");
            }
            Ok(())
        }
    }
}
