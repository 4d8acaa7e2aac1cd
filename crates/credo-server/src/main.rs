//! `credo` server binary.
//!
//! Reads `credo.toml` (or the path given with `--config`) layered under
//! `CREDO_*` environment variables, opens the SQLite store, and either serves
//! the HTTP API while scoring on a fixed interval, runs a single scoring
//! pass, or registers a model version.
//!
//! # Usage
//!
//! ```
//! credo serve
//! credo score --at 2024-06-01T00:00:00Z
//! credo register-model --file model.json --no-activate
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use credo_core::{model::NewModel, store::CreditStore};
use credo_server::{Scheduler, ServerConfig, expand_tilde, load_config};
use credo_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Credo credit scoring server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "credo.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API and score every issuer on a fixed interval.
  Serve,
  /// Score every issuer once and exit.
  Score {
    /// Cycle cutoff (RFC 3339). Defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
  },
  /// Register a model version from a JSON file.
  RegisterModel {
    #[arg(long)]
    file:        PathBuf,
    /// Keep the current model; only record this version.
    #[arg(long)]
    no_activate: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = load_config(&cli.config).context("failed to load configuration")?;
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, server_cfg).await,
    Command::Score { at } => score_once(store, &server_cfg, at.unwrap_or_else(Utc::now)).await,
    Command::RegisterModel { file, no_activate } => {
      register_model(store.as_ref(), &file, !no_activate).await
    }
  }
}

async fn serve(store: Arc<SqliteStore>, cfg: ServerConfig) -> anyhow::Result<()> {
  let policy = cfg.alerts.policy().context("invalid alert policy")?;
  let scheduler = Scheduler::new(store.clone(), policy, cfg.scheduler.max_concurrent_issuers);
  let period = Duration::from_secs(cfg.scheduler.interval_secs.max(1));

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      if let Err(e) = scheduler.run_once(Utc::now()).await {
        tracing::error!(error = %e, fatal = e.is_fatal(), "scoring run failed");
      }
    }
  });

  let app = credo_server::router(store);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn score_once(
  store: Arc<SqliteStore>,
  cfg: &ServerConfig,
  cutoff: DateTime<Utc>,
) -> anyhow::Result<()> {
  let policy = cfg.alerts.policy().context("invalid alert policy")?;
  let scheduler = Scheduler::new(store, policy, cfg.scheduler.max_concurrent_issuers);
  let report = scheduler
    .run_once(cutoff)
    .await
    .context("scoring run aborted")?;
  println!("{}", serde_json::to_string_pretty(&report)?);
  if !report.failed.is_empty() {
    anyhow::bail!("{} issuer(s) failed to score", report.failed.len());
  }
  Ok(())
}

async fn register_model(
  store: &SqliteStore,
  file: &std::path::Path,
  activate: bool,
) -> anyhow::Result<()> {
  let raw = tokio::fs::read_to_string(file)
    .await
    .with_context(|| format!("reading model file {}", file.display()))?;
  let model: NewModel = serde_json::from_str(&raw).context("parsing model file")?;
  let stored = store
    .register_model(model, activate)
    .await
    .context("failed to register model")?;
  let current = store
    .current_model()
    .await?
    .map(|m| m.model_version)
    .unwrap_or_default();
  tracing::info!(
    model_version = %stored.model_version,
    current = %current,
    "model registered"
  );
  Ok(())
}
