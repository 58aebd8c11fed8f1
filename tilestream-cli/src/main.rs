//! Tilestream CLI - inspect, generate and walk tile content.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tilestream::logging::{self, LoggingConfig};

use commands::ids::{ContentIdArgs, TreeIdArgs};
use commands::walk::WalkArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilestream", version, about = "Inspect, generate and walk streamed tile content")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this directory instead of stderr
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the header and a content summary of a tile file
    Inspect {
        /// Tile content file
        file: PathBuf,
    },

    /// Print the canonical id of a tile tree
    TreeId(TreeIdArgs),

    /// Print the id of one tile's content
    ContentId(ContentIdArgs),

    /// Write a sample single-rectangle tile
    Sample {
        /// Output file
        out: PathBuf,

        /// Format version as MAJOR.MINOR
        #[arg(long, default_value = "4.0")]
        version: String,
    },

    /// Load a tile tree from a directory and report what was loaded
    Walk(WalkArgs),
}

fn init_logging(cli: &Cli) -> Result<Option<logging::WorkerGuard>, CliError> {
    let mut config = LoggingConfig::default();
    if !cli.verbose {
        config = config.with_filter("warn");
    }
    if let Some(dir) = &cli.log_dir {
        config = config.with_directory(dir);
    }
    Ok(logging::init(&config)?)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _guard = init_logging(&cli)?;

    match cli.command {
        Commands::Inspect { file } => commands::inspect::run(&file),
        Commands::TreeId(args) => commands::ids::run_tree_id(args),
        Commands::ContentId(args) => commands::ids::run_content_id(args),
        Commands::Sample { out, version } => commands::sample::run(&out, &version),
        Commands::Walk(args) => commands::walk::run(args),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
