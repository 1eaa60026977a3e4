//! `trail-redux` scheduled job: one reduction run against the configured backend.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use trail_redux::{run_once, AppConfig, PipelineSettings, PocketBaseClient, Result, RunStats, StateStore};

#[derive(Parser, Debug)]
#[command(version, about = "Shrink stored GPX trail files where it pays off")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// State file (overrides `state_path` from the configuration)
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: Cli) -> Result<RunStats> {
    let config = AppConfig::load(&cli.config)?;
    let store = StateStore::new(cli.state.unwrap_or_else(|| config.state_path.clone()));
    info!("[Main] Using state file {}", store.path().display());

    let backend = PocketBaseClient::connect(&config.pocketbase).await?;
    run_once(&backend, &store, PipelineSettings::from_config(&config)).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(stats) => {
            info!(
                "[Main] Done: {} of {} candidates changed, {} bytes saved",
                stats.files_changed, stats.candidates, stats.bytes_saved
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("[Main] Run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
