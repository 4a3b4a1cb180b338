//! Daemon and one-shot entrypoint for the fixflow sweeps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fixflow_store::{AuditSink, IssueStore, SqliteAuditSink, SqliteIssueStore};
use fixflow_sweeps::{run_auto_close_sweep, run_breach_sweep, SweepConfig, SweepScheduler};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixflow", about = "Issue lifecycle and SLA compliance engine")]
struct Cli {
    /// SQLite database holding issues and the audit trail.
    #[arg(long, env = "FIXFLOW_DB", default_value = "fixflow.sqlite")]
    db: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sweep scheduler until interrupted.
    Run {
        #[arg(long, default_value_t = 3600)]
        breach_interval_seconds: u64,
        #[arg(long, default_value_t = 86400)]
        auto_close_interval_seconds: u64,
        #[arg(long, default_value_t = 48)]
        auto_close_grace_hours: u64,
    },
    /// Run both sweeps once and print the reports as JSON.
    Sweep {
        #[arg(long, default_value_t = 48)]
        auto_close_grace_hours: u64,
    },
    /// Print per-tenant SLA compliance statistics as JSON.
    Stats {
        #[arg(long)]
        tenant: String,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let store: Arc<dyn IssueStore> = Arc::new(
        SqliteIssueStore::new(&cli.db)
            .with_context(|| format!("open issue store at {}", cli.db.display()))?,
    );
    let sink: Arc<dyn AuditSink> = Arc::new(
        SqliteAuditSink::new(&cli.db)
            .with_context(|| format!("open audit sink at {}", cli.db.display()))?,
    );

    match cli.command {
        Command::Run {
            breach_interval_seconds,
            auto_close_interval_seconds,
            auto_close_grace_hours,
        } => {
            let config = SweepConfig {
                breach_interval: Duration::from_secs(breach_interval_seconds),
                auto_close_interval: Duration::from_secs(auto_close_interval_seconds),
                auto_close_grace: Duration::from_secs(auto_close_grace_hours * 60 * 60),
            };
            config.validate()?;
            let scheduler = SweepScheduler::new(store, sink, config);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });

            tracing::info!(db = %cli.db.display(), "sweep scheduler started");
            scheduler.run(shutdown_rx).await?;
            tracing::info!("sweep scheduler stopped");
        }
        Command::Sweep {
            auto_close_grace_hours,
        } => {
            let now = Utc::now();
            let breach = run_breach_sweep(store.as_ref(), sink.as_ref(), now).await?;
            let auto_close = run_auto_close_sweep(
                store.as_ref(),
                sink.as_ref(),
                now,
                Duration::from_secs(auto_close_grace_hours * 60 * 60),
            )
            .await?;

            let report = serde_json::json!({
                "breach": breach,
                "auto_close": auto_close,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Stats { tenant } => {
            let stats = store.sla_stats(&tenant).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
