//! # fstore CLI
//!
//! Command-line interface for the fstore content-addressable blob store.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fstore_cas::{split_request_path, Store, StoreError};
use fstore_config::{init_logging, log_cli_debug, log_cli_error, log_cli_info, Config};

mod gc;

/// fstore - content-addressable blob store on a local filesystem
#[derive(Parser)]
#[command(name = "fstore")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Store root directory (overrides `storage.root`)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file to use instead of the global/project lookup
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file (or stdin) and print its blob info as JSON
    Put {
        /// File to store; `-` or nothing reads stdin
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Prefix directory under the store root
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Write a blob's bytes to stdout or a file
    Get {
        /// Content name; anything after a `/` is ignored
        name: String,

        #[arg(short, long)]
        prefix: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a blob
    Rm {
        /// Content name; anything after a `/` is ignored
        name: String,

        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Remove blobs older than the configured lifetime
    Clean(gc::CleanArgs),

    /// Show blob count and size of the store
    Stats,

    /// Print the default configuration as TOML
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            log_cli_error!("Command failed", error = message.as_str());
            match e.downcast_ref::<StoreError>() {
                Some(StoreError::NotFound { name }) => eprintln!("not found: {}", name),
                _ => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    let level = (0..cli.verbose).fold(config.log.level, |level, _| level.more_verbose());
    init_logging(level);

    // Opening creates the root, so commands that don't need it skip this.
    let open_store = || -> Result<Store> {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| config.storage.resolved_root());
        let store = Store::open(&root)
            .with_context(|| format!("Failed to open store {}", root.display()))?;
        let root_str = store.root().display().to_string();
        log_cli_debug!("Store opened", root = root_str.as_str());
        Ok(store)
    };

    let prefix_or_default =
        |prefix: Option<String>| prefix.unwrap_or_else(|| config.storage.prefix.clone());

    match cli.command {
        Commands::Put { file, prefix } => {
            let store = open_store()?;
            let prefix = prefix_or_default(prefix);
            let info = match file {
                Some(path) if path.as_os_str() != "-" => {
                    let file = File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    store.create(&prefix, file)?
                }
                _ => store.create(&prefix, io::stdin().lock())?,
            };
            log_cli_info!("Blob stored", name = info.name.as_str(), size = info.size);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Get {
            name,
            prefix,
            output,
        } => {
            let store = open_store()?;
            let prefix = prefix_or_default(prefix);
            let (name, _ext) = split_request_path(&name);
            let mut blob = store.open_blob(&prefix, name)?;
            let copied = match output {
                Some(path) => {
                    let mut out = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    io::copy(&mut blob, &mut out)?
                }
                None => io::copy(&mut blob, &mut io::stdout().lock())?,
            };
            log_cli_debug!("Blob written", name = name, bytes = copied);
        }
        Commands::Rm { name, prefix } => {
            let store = open_store()?;
            let prefix = prefix_or_default(prefix);
            let (name, _ext) = split_request_path(&name);
            store.remove(&prefix, name)?;
            log_cli_info!("Blob removed", name = name);
        }
        Commands::Clean(args) => {
            let lifetime = config.gc.lifetime()?;
            let store = open_store()?;
            gc::run(&store, lifetime, args)?;
        }
        Commands::Stats => {
            let store = open_store()?;
            let stats = store.stats()?;
            println!("  Root:        {}", store.root().display());
            println!("  Blobs:       {}", gc::format_number(stats.blob_count));
            println!("  Total size:  {}", gc::format_bytes(stats.total_bytes));
            println!("  Average:     {}", gc::format_bytes(stats.avg_blob_size()));
        }
        Commands::Config => print!("{}", Config::default_toml()),
    }
    Ok(())
}

