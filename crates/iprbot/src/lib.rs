//! InterPro protein bot
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Adds InterPro family and domain membership to UniProt protein items in
//! Wikidata as "part of" (P361) and "has part" (P527) statements, referenced
//! by the InterPro release they come from, then removes statements left over
//! from earlier releases.
//!
//! # Overview
//!
//! - **Mapping files**: the protein→InterPro source file and per-taxon caches ([`mapping`])
//! - **Reconciliation**: per-protein and batch edits through the fast-run cache ([`reconcile`])
//! - **Cleanup**: removal of statements cited only by older releases ([`cleanup`])
//! - **Pipeline**: the full run ([`pipeline`])
//! - **Configuration**: environment settings ([`config`])

pub mod cleanup;
pub mod config;
pub mod mapping;
pub mod pipeline;
pub mod progress;
pub mod props;
pub mod reconcile;

pub use config::BotConfig;
pub use pipeline::{RunOptions, RunReport};

use clap::{Args, Parser, Subcommand};
use iprbot_wikibase::Qid;
use std::path::PathBuf;

/// InterproBot_Proteins - sync InterPro relationships onto Wikidata proteins
#[derive(Parser, Debug)]
#[command(name = "iprbot")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every command that reads the mapping files
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Restrict to proteins found in this taxon (e.g. Q15978631 for human)
    #[arg(long)]
    pub taxon: Option<Qid>,

    /// Source mapping file [env: IPRBOT_SOURCE_PATH]
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Directory for per-taxon cache files [env: IPRBOT_CACHE_DIR]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add/update relationships, then remove deprecated statements
    Run {
        /// Item of the InterPro release being loaded
        #[arg(long)]
        release: Qid,

        #[command(flatten)]
        source: SourceArgs,

        /// Plan edits without writing them
        #[arg(long)]
        no_write: bool,

        /// Stop after the first record
        #[arg(long)]
        run_one: bool,

        /// Skip the deprecated-statement cleanup pass
        #[arg(long)]
        skip_cleanup: bool,

        /// Directory for the run log
        #[arg(long, default_value = "./logs")]
        log_dir: PathBuf,

        /// Run id used in the log file name (default: current time)
        #[arg(long)]
        run_id: Option<String>,

        /// Seconds to wait before cleanup [env: IPRBOT_CLEANUP_DELAY_SECS]
        #[arg(long)]
        cleanup_delay_secs: Option<u64>,
    },

    /// Only build the per-taxon cache file
    BuildCache {
        #[command(flatten)]
        source: SourceArgs,
    },
}

impl SourceArgs {
    /// Apply the path overrides on top of environment configuration
    pub fn apply(&self, config: &mut BotConfig) {
        if let Some(source) = &self.source {
            config.source_path = source.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
    }
}
