use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::compress::DEFAULT_LEVEL;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deduplicating archiver", long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create an archive from a directory or a single file.
    #[command(alias = "c")]
    Create {
        /// The archive file to write (e.g., backup.mtar).
        archive: PathBuf,

        /// Directory (or file) to archive.
        source: PathBuf,

        /// Zstandard compression level (1-22). Higher levels offer better compression at the cost of speed.
        #[arg(long, env = "MTAR_LEVEL", default_value_t = DEFAULT_LEVEL,
              value_parser = clap::value_parser!(i32).range(1..=22))]
        level: i32,

        /// Number of worker threads. [0 = auto-detect based on CPU cores]
        #[arg(long, env = "MTAR_THREADS", default_value_t = 0)]
        threads: usize,

        /// Skip re-reading and verifying the archive after it is written.
        #[arg(long)]
        skip_check: bool,
    },

    /// Extract an archive into a directory, creating it if absent.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        archive: PathBuf,

        /// Destination directory.
        dest: PathBuf,

        /// Number of worker threads. [0 = auto-detect based on CPU cores]
        #[arg(long, env = "MTAR_THREADS", default_value_t = 0)]
        threads: usize,
    },

    /// List the contents of an archive without extracting it.
    #[command(alias = "l")]
    List {
        /// The archive file to list contents of.
        archive: PathBuf,

        /// Show kind, size and content fingerprint for each entry.
        #[arg(short, long, conflicts_with = "json")]
        long: bool,

        /// Print entries as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Decode every block and check it against its fingerprint.
    Verify {
        /// The archive file to verify.
        archive: PathBuf,
    },
}
