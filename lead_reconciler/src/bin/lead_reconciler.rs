use std::{io::Read, path::PathBuf, sync::Arc};

use ad_conversions::uploader::google_ads::GoogleAdsClient;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use commerce_orders::providers::shopmonkey::ShopmonkeyProvider;
use lead_reconciler::{
    config::{AppConfig, load_config_path},
    db::{connection::connect_sqlite_with_timeout, migrate},
    intake::{LeadEvent, accept_lead_event},
    ledger::SqliteLedger,
    observability::{LogFormat, init_logging},
    queue, runner,
    worker::{Backoffs, Outcome, ReconcileDeps, ReconcileSettings, reconcile_lead},
};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Lead to conversion reconciler")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
    /// Overrides `[logging] format`.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Record a lead event read from a JSON file (`-` for stdin).
    Ingest {
        #[arg(long, value_name = "FILE")]
        file: String,
    },
    /// Run one reconciliation attempt for a lead, outside the queue.
    Reconcile {
        #[arg(long)]
        lead_id: i32,
    },
    /// Drain the queue with the worker pool.
    Work {
        /// Run due tasks on one connection and exit.
        #[arg(long)]
        once: bool,
    },
    /// List tasks that ran out of retries or failed fatally.
    Failed,
}

fn build_deps(cfg: &AppConfig) -> Result<ReconcileDeps> {
    let orders = ShopmonkeyProvider::from_env(cfg.commerce.clone())?;
    let uploader = GoogleAdsClient::from_env(cfg.ads.clone())?;
    Ok(ReconcileDeps {
        orders: Arc::new(orders),
        uploader: Arc::new(uploader),
        ledger: Arc::new(SqliteLedger::new()),
    })
}

fn reconcile_settings(cfg: &AppConfig) -> Result<ReconcileSettings> {
    Ok(ReconcileSettings {
        backoffs: Backoffs::from(&cfg.worker),
        zone: cfg.zone()?,
        claim_ttl: cfg.worker.claim_ttl(),
    })
}

fn read_event(file: &str) -> Result<serde_json::Value> {
    let mut s = String::new();
    if file == "-" {
        std::io::stdin().read_to_string(&mut s)?;
    } else {
        s = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
    }
    serde_json::from_str(&s).context("lead event is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config_path(&cli.config)?;
    init_logging(cli.log_format.unwrap_or(cfg.logging.format));

    match cli.cmd {
        Cmd::Migrate => {
            migrate::run_all(&cfg.database_url)?;
        }
        Cmd::Ingest { file } => {
            let event = LeadEvent::from_payload(read_event(&file)?, Utc::now());
            let mut conn = connect_sqlite_with_timeout(&cfg.database_url, cfg.worker.busy_timeout())?;
            let receipt = accept_lead_event(&mut conn, &event, Utc::now())?;
            println!(
                "lead {} ({}), task {}",
                receipt.lead_id,
                if receipt.created { "created" } else { "existing" },
                receipt
                    .task_id
                    .map_or_else(|| "not queued".to_string(), |id| id.to_string())
            );
        }
        Cmd::Reconcile { lead_id } => {
            let deps = build_deps(&cfg)?;
            let settings = reconcile_settings(&cfg)?;
            let mut conn = connect_sqlite_with_timeout(&cfg.database_url, cfg.worker.busy_timeout())?;
            match reconcile_lead(&mut conn, lead_id, &deps, &settings, Utc::now()).await? {
                Outcome::Finished(status) => println!("{status}"),
                Outcome::Retry { after, reason } => {
                    println!("retry in {}s: {reason}", after.as_secs())
                }
            }
        }
        Cmd::Work { once } => {
            let deps = build_deps(&cfg)?;
            let settings = reconcile_settings(&cfg)?;
            if once {
                let mut conn =
                    connect_sqlite_with_timeout(&cfg.database_url, cfg.worker.busy_timeout())?;
                let ran = runner::drain(&mut conn, "cli", &deps, &settings, &cfg.worker).await?;
                info!(ran, "queue drained");
            } else {
                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown requested");
                        let _ = tx.send(true);
                    }
                });
                runner::run_pool(&cfg.database_url, deps, settings, cfg.worker.clone(), rx).await?;
            }
        }
        Cmd::Failed => {
            let mut conn = connect_sqlite_with_timeout(&cfg.database_url, cfg.worker.busy_timeout())?;
            for task in queue::list_failed(&mut conn)? {
                println!(
                    "task {}\tlead {}\tattempts {}\t{}\t{}",
                    task.id,
                    task.lead_id,
                    task.attempts,
                    task.updated_at,
                    task.last_error.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
