//! docrelay: relay notes between a private and a shared document store.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use docrelay::sync::{CursorPolicy, TransferConfig};
use docrelay::{RelayConfig, RelaySettings, Supervisor};

#[derive(Parser)]
#[command(name = "docrelay")]
#[command(about = "Relay notes between a private and a shared encrypted document store")]
struct Cli {
    /// Path to the sync pair configuration
    #[arg(short, long, env = "DOCRELAY_CONFIG", default_value = "./dat/config.json")]
    config: PathBuf,

    /// Path to the sync cursor file
    #[arg(short, long, env = "DOCRELAY_STATE", default_value = "./dat/stat.json")]
    state: PathBuf,

    /// Keep the other pairs running when one pair's change feed fails
    #[arg(long, env = "DOCRELAY_KEEP_GOING")]
    keep_going: bool,

    /// Attempts per document before giving up on conflicts
    #[arg(long, default_value_t = 10)]
    max_attempts: u32,

    /// Pause between attempts, in milliseconds
    #[arg(long, default_value_t = 1500)]
    retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docrelay=info".parse()?)
                .add_directive("docrelay_sync=info".parse()?)
                .add_directive("docrelay_store=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("docrelay starting up");
    info!("Config file: {}", cli.config.display());

    let config = RelayConfig::load(&cli.config)?;
    let settings = RelaySettings {
        state_path: cli.state,
        keep_going: cli.keep_going,
        transfer: TransferConfig {
            max_attempts: cli.max_attempts,
            retry_delay: Duration::from_millis(cli.retry_delay_ms),
        },
        cursors: CursorPolicy::default(),
    };
    info!("Cursor file: {}", settings.state_path.display());
    info!("Pairs: {}", config.keys().collect::<Vec<_>>().join(", "));

    let supervisor = Supervisor::from_config(&config, settings)?;
    supervisor.sanity_check().await;

    tokio::select! {
        result = supervisor.run() => {
            let summary = result?;
            for failed in &summary.failed {
                warn!(pair = %failed.pair, reason = %failed.reason, "pair failed");
            }
            if !summary.failed.is_empty() {
                anyhow::bail!("{} pair(s) failed", summary.failed.len());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            supervisor.flush_cursors().await;
        }
    }

    Ok(())
}
