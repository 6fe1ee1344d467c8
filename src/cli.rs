use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(author, version, about = "Media ingest orchestrator")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one request through the pipeline and print the completion report
    Run {
        /// Request as a JSON file path, inline JSON, or `-` for stdin
        #[arg(required = true)]
        request: String,

        /// Also print the accumulated record
        #[arg(long)]
        record: bool,
    },

    /// Sample unprocessed objects from the configured bucket and run them
    Batch {
        /// Objects to process (overrides batch.count)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Object prefix (overrides batch.prefix)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Search the catalog for the first usable candidate
    Search {
        /// Search phrase
        #[arg(required = true)]
        phrase: String,

        /// Run the found asset through the pipeline
        #[arg(long)]
        run: bool,
    },

    /// Print the descriptor a request normalizes to
    Normalize {
        /// Request as a JSON file path, inline JSON, or `-` for stdin
        #[arg(required = true)]
        request: String,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
