//! issuepipe - pull, merge and convert issue-tracker pages

use anyhow::Result;
use clap::{Parser, Subcommand};
use issuepipe::logging::init_logging;
use issuepipe::merge::DEFAULT_CHUNK_SIZE;
use issuepipe::{
    Codec, ConvertOptions, HttpFetcher, MergeOptions, PullOptions, Settings, StageError,
    run_convert, run_merge, run_pull,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "issuepipe")]
#[command(author, version, about = "Mirror a paginated issue API into Parquet")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data root holding raw/, interim/ and processed/
    #[arg(long, global = true, env = "ISSUEPIPE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch pages from the API into the raw data directory
    Pull {
        /// First page to fetch (zero-based)
        #[arg(long, default_value_t = 0)]
        start_page: u32,

        /// Page to stop before; defaults to one page in dev mode, else all pages
        #[arg(long)]
        end_page: Option<u32>,

        /// Refetch even if the page file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Merge stored pages into a single CSV table
    Merge {
        /// Number of files to process at once
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Convert the merged table to Parquet
    Convert {
        /// Number of rows per chunk while reading
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Compression codec for the primary encoding
        #[arg(long, value_enum, default_value_t = Codec::Snappy)]
        compression: Codec,

        /// Output file (default: <data-dir>/processed/merged.parquet)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings = settings.with_data_dir(dir);
    }

    match cli.command {
        Command::Pull {
            start_page,
            end_page,
            force,
        } => {
            info!(base_url = %settings.base_url, dev_mode = settings.dev_mode, "retrieving data");
            let fetcher = HttpFetcher::new(&settings);
            let opts = PullOptions {
                start_page,
                end_page,
                force,
            };
            let report = run_pull(&fetcher, &settings, &opts).map_err(stage_failed)?;
            for failure in &report.failures {
                warn!(%failure, "not fetched, rerun pull to retry");
            }
        }
        Command::Merge { chunk_size } => {
            let report = run_merge(&settings, &MergeOptions { chunk_size }).map_err(stage_failed)?;
            if !report.failures.is_empty() {
                warn!(skipped = report.failures.len(), "some files were skipped");
            }
        }
        Command::Convert {
            chunk_size,
            compression,
            output,
        } => {
            let opts = ConvertOptions {
                chunk_size,
                compression,
                output,
            };
            run_convert(&settings, &opts).map_err(stage_failed)?;
        }
    }
    Ok(())
}

fn stage_failed(e: StageError) -> anyhow::Error {
    if e.is_config() {
        warn!("no work performed");
    }
    anyhow::Error::new(e)
}
