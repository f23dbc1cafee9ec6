//! opal - decentralized program launcher
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Runs programs named by interface URIs. Each URI resolves to a signed
//! feed of candidate implementations; opal picks a consistent set of
//! versions, fetches the missing ones into a content-addressed store,
//! applies their environment bindings, and launches the result.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.opal/
//! ├── store/      # Implementations by content digest
//! ├── feeds/      # Verified feed documents
//! └── trust.json  # Trusted signing keys per domain
//! ```

pub mod cmd;
pub mod ui;

// Re-exports from the engine for convenience
pub use opal_core::USER_AGENT;
pub use opal_core::driver::Driver;
pub use opal_core::paths;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use opal_schema::Stability;

#[derive(Debug, Parser)]
#[command(name = "opal")]
#[command(author, version, about = "opal - decentralized program launcher")]
pub struct Cli {
    /// Show what would happen without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve, fetch, and run a program
    Run {
        /// Interface URI of the program
        #[arg(required_unless_present = "selections")]
        uri: Option<String>,
        /// Arguments passed through to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Re-download feeds even if cached
        #[arg(long, short = 'r')]
        refresh: bool,
        /// Prefer cached implementations over newer uncached ones
        #[arg(long)]
        cached: bool,
        /// Minimum acceptable stability (insecure|buggy|developer|testing|stable)
        #[arg(long)]
        stability: Option<Stability>,
        /// Entry-point override inside the chosen implementation
        #[arg(long, short = 'm')]
        main: Option<String>,
        /// Wrapper command interposed around the program (e.g. a debugger)
        #[arg(long, short = 'w')]
        wrapper: Option<String>,
        /// Replay a previously saved selection set instead of re-solving
        #[arg(long)]
        selections: Option<PathBuf>,
    },
    /// Resolve a program and show the chosen implementations
    Select {
        /// Interface URI of the program
        uri: String,
        /// Re-download feeds even if cached
        #[arg(long, short = 'r')]
        refresh: bool,
        /// Prefer cached implementations over newer uncached ones
        #[arg(long)]
        cached: bool,
        /// Minimum acceptable stability (insecure|buggy|developer|testing|stable)
        #[arg(long)]
        stability: Option<Stability>,
        /// Save the selection set as JSON for later replay
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Resolve a program and fetch everything it needs, without running it
    Download {
        /// Interface URI of the program
        uri: String,
        /// Re-download feeds even if cached
        #[arg(long, short = 'r')]
        refresh: bool,
        /// Minimum acceptable stability (insecure|buggy|developer|testing|stable)
        #[arg(long)]
        stability: Option<Stability>,
    },
    /// Inspect trusted signing keys
    Trust {
        #[command(subcommand)]
        command: TrustCommands,
    },
    /// Inspect the implementation store
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum TrustCommands {
    /// List trusted keys and their domains
    List,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommands {
    /// List cached implementations
    List,
}
