//! Command-line interface for stream-forward
//!
//! # Usage Examples
//!
//! ## Forwarding run
//! ```bash
//! # Invoked by the scheduler at a fixed interval
//! FEED_TOKEN=... SINK_URL=https://ingest.example.com/readings \
//! stream-forward run \
//!   --feed-endpoint https://api.example.com/api/v1/projects/plant \
//!   --subscription plant-sensors \
//!   --state-key plant-sensors-cursor
//!
//! # Keep cursors on local disk instead of the backend
//! stream-forward run ... --cursor-store filesystem --cursor-dir /var/lib/stream-forward
//!
//! # See what would be sent without sending it
//! stream-forward run ... --dry-run
//! ```
//!
//! ## Cursor inspection
//! ```bash
//! stream-forward cursor show \
//!   --feed-endpoint https://api.example.com/api/v1/projects/plant \
//!   --state-key plant-sensors-cursor
//!
//! # Local cursors need no backend
//! stream-forward cursor show --state-key plant-sensors-cursor \
//!   --cursor-store filesystem --cursor-dir /var/lib/stream-forward
//! ```
//!
//! Set `RUST_LOG` to change verbosity (default: `info`).

use checkpoint::CursorStore;
use clap::{Parser, Subcommand};
use stream_forward::{forward_changes, CursorShowOpts, ForwarderConfig, RunOpts, RunOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stream-forward")]
#[command(about = "Forward time series changes to an HTTP sink, exactly once per cursor advance")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward every change since the stored cursor, then advance the cursor
    Run {
        #[command(flatten)]
        opts: RunOpts,
    },

    /// Inspect stored cursors
    Cursor {
        #[command(subcommand)]
        command: CursorCommand,
    },
}

#[derive(Subcommand)]
enum CursorCommand {
    /// Print the current cursor for a state key
    Show {
        #[command(flatten)]
        opts: CursorShowOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { opts } => {
            let config = ForwarderConfig::try_from(&opts)?;
            match forward_changes(&config).await? {
                RunOutcome::NoOp { .. } => {}
                RunOutcome::CursorAdvanced {
                    published, cursor, ..
                } => {
                    tracing::info!("Run complete: {published} records delivered, cursor {cursor}");
                }
                RunOutcome::DryRun { batch, .. } => {
                    tracing::info!(
                        "Dry run complete: {} records would have been delivered",
                        batch.len()
                    );
                }
            }
        }

        Commands::Cursor {
            command: CursorCommand::Show { opts },
        } => {
            let store = opts.open_store()?;
            match store.read_cursor(&opts.cursor.state_key).await? {
                Some(stored) => println!(
                    "{}\t{}",
                    stored.cursor,
                    stored.written_at.to_rfc3339()
                ),
                None => println!("none"),
            }
        }
    }

    Ok(())
}
