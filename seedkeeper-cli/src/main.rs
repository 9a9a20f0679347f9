//! Seedkeeper CLI.
//!
//! Every invocation is its own session: the wallet starts locked, the
//! command runs, and the session key is gone when the process exits.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Seedkeeper: a password-gated store for a wallet recovery seed.
#[derive(Parser)]
#[command(name = "seedkeeper", version, about)]
struct Cli {
    /// Output in JSON format (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the store. Defaults to the platform data directory.
    #[arg(long, global = true, env = "SEEDKEEPER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON configuration file (`kdf_iterations`, `auto_lock_secs`, ...).
    #[arg(long, global = true, env = "SEEDKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Wallet password.
    #[arg(long, global = true, env = "SEEDKEEPER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a wallet exists and which backend holds it.
    Status,
    /// Create a wallet protecting the given seed phrase.
    Init {
        /// The seed phrase to protect.
        #[arg(long, env = "SEEDKEEPER_SEED", hide_env_values = true)]
        seed: String,
    },
    /// Verify the password.
    Unlock,
    /// Unlock and print the seed phrase.
    ShowSeed,
    /// Permanently delete the wallet.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

/// Shared options threaded into command handlers.
pub struct GlobalOpts {
    /// Print JSON instead of `key: value` lines.
    pub json: bool,
    /// Explicit data directory; `None` means the platform default.
    pub data_dir: Option<PathBuf>,
    /// Optional JSON config file.
    pub config: Option<PathBuf>,
    /// Password for commands that need one.
    pub password: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let opts = GlobalOpts {
        json: cli.json,
        data_dir: cli.data_dir,
        config: cli.config,
        password: cli.password,
    };

    match dispatch(&opts, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            output::print_error(&report, opts.json);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(opts: &GlobalOpts, cmd: Commands) -> eyre::Result<()> {
    match cmd {
        Commands::Status => commands::status(opts).await,
        Commands::Init { seed } => commands::init(opts, &seed).await,
        Commands::Unlock => commands::unlock(opts).await,
        Commands::ShowSeed => commands::show_seed(opts).await,
        Commands::Clear { yes } => commands::clear(opts, yes).await,
    }
}
