//! Server wiring for Credo.
//!
//! Configuration, the scoring [`scheduler`], and the HTTP [`router`] that
//! mounts the JSON API. The `credo` binary in `main.rs` ties them together.

pub mod scheduler;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use credo_core::{alert::AlertPolicy, store::CreditStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use scheduler::{IssuerLocks, RunReport, Scheduler};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `credo.toml` and
/// `CREDO_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub scheduler:  SchedulerConfig,
  #[serde(default)]
  pub alerts:     AlertPolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  /// Seconds between scoring runs while serving.
  #[serde(default = "default_interval_secs")]
  pub interval_secs:          u64,
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent_issuers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertPolicyConfig {
  #[serde(default = "default_lookback_hours")]
  pub lookback_hours:      i64,
  /// Defaults to the lookback.
  #[serde(default)]
  pub dedupe_window_hours: Option<i64>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("credo.db") }
fn default_interval_secs() -> u64 { 900 }
fn default_max_concurrent() -> usize { 8 }
fn default_lookback_hours() -> i64 { credo_core::alert::DEFAULT_LOOKBACK_HOURS }

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      interval_secs:          default_interval_secs(),
      max_concurrent_issuers: default_max_concurrent(),
    }
  }
}

impl Default for AlertPolicyConfig {
  fn default() -> Self {
    Self {
      lookback_hours:      default_lookback_hours(),
      dedupe_window_hours: None,
    }
  }
}

impl AlertPolicyConfig {
  pub fn policy(&self) -> credo_core::Result<AlertPolicy> {
    AlertPolicy::from_hours(
      self.lookback_hours,
      self.dedupe_window_hours.unwrap_or(self.lookback_hours),
    )
  }
}

/// Layer the optional TOML file at `path` under `CREDO_*` environment
/// variables. Nested keys use `__`, e.g. `CREDO_SCHEDULER__INTERVAL_SECS`.
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("CREDO")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The full HTTP surface: the JSON API under `/api` plus a liveness probe.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: CreditStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", credo_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
