//! The `CreditStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `credo-store-sqlite`).
//! The scoring cycle, query surface, and HTTP layer depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
  alert::{AlertHistory, AlertRecord, AlertSubscription, NewAlert, NewSubscription},
  event::{Event, NewEvent},
  issuer::{Issuer, NewIssuer},
  model::{ModelMetadata, NewModel},
  observation::{
    FeatureSnapshot, MacroObservation, NewFeatureSnapshot, NewMacroObservation,
    NewPriceObservation, PriceObservation,
  },
  score::{NewScore, Score},
};

/// Abstraction over a Credo time-series store backend.
///
/// Every entity is append-only: observations, events, scores, and alerts are
/// never updated after they are written, and "latest" is always a read
/// ordered by timestamp. The only mutable state is the current-model pointer
/// and a subscription's `active` flag.
///
/// Backend errors must convert into [`crate::Error`] so the engine can tell
/// per-issuer failures from fatal ones.
pub trait CreditStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Issuers ───────────────────────────────────────────────────────────

  /// Register an issuer. Tickers are unique.
  fn add_issuer(
    &self,
    input: NewIssuer,
  ) -> impl Future<Output = Result<Issuer, Self::Error>> + Send + '_;

  fn get_issuer(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Issuer>, Self::Error>> + Send + '_;

  /// List issuers ordered by name, optionally restricted to one sector.
  fn list_issuers(
    &self,
    sector: Option<String>,
  ) -> impl Future<Output = Result<Vec<Issuer>, Self::Error>> + Send + '_;

  // ── Observations, append-only ─────────────────────────────────────────

  fn record_feature(
    &self,
    input: NewFeatureSnapshot,
  ) -> impl Future<Output = Result<FeatureSnapshot, Self::Error>> + Send + '_;

  fn record_price(
    &self,
    input: NewPriceObservation,
  ) -> impl Future<Output = Result<PriceObservation, Self::Error>> + Send + '_;

  fn record_macro(
    &self,
    input: NewMacroObservation,
  ) -> impl Future<Output = Result<MacroObservation, Self::Error>> + Send + '_;

  /// Record an event. A missing `content_hash` is derived from the headline
  /// and URL. Re-ingested content is stored like any other row; it is
  /// recognised and excluded at scoring time.
  fn record_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  // ── Observation reads ─────────────────────────────────────────────────

  /// The most recent snapshot of each feature for `issuer_id` with
  /// `ts <= cutoff`.
  fn latest_features(
    &self,
    issuer_id: Uuid,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<FeatureSnapshot>, Self::Error>> + Send + '_;

  /// Up to `limit` most recent prices with `ts <= cutoff`, oldest first.
  fn price_history(
    &self,
    issuer_id: Uuid,
    cutoff: DateTime<Utc>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<PriceObservation>, Self::Error>> + Send + '_;

  /// The most recent observation of each macro key with `ts <= cutoff`.
  fn latest_macro(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<MacroObservation>, Self::Error>> + Send + '_;

  /// Events for `issuer_id` with `since <= ts <= until`, together with any
  /// earlier event sharing a content hash with one of them, so re-ingested
  /// content can be recognised against its first ingestion.
  fn events_between(
    &self,
    issuer_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Persist a score. Writes are idempotent on `(issuer_id, ts)`: when a row
  /// already exists for that cutoff it is returned unchanged.
  fn record_score(
    &self,
    input: NewScore,
  ) -> impl Future<Output = Result<Score, Self::Error>> + Send + '_;

  fn latest_score(
    &self,
    issuer_id: Uuid,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + '_;

  /// The most recent score with `ts <= at`.
  fn score_at_or_before(
    &self,
    issuer_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + '_;

  /// Up to `limit` scores, newest first.
  fn score_history(
    &self,
    issuer_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Score>, Self::Error>> + Send + '_;

  /// The latest score of every issuer that has one.
  fn latest_scores(
    &self,
  ) -> impl Future<Output = Result<Vec<Score>, Self::Error>> + Send + '_;

  // ── Models ────────────────────────────────────────────────────────────

  /// Register a model version. The first model ever registered becomes
  /// current regardless of `activate`.
  fn register_model(
    &self,
    input: NewModel,
    activate: bool,
  ) -> impl Future<Output = Result<ModelMetadata, Self::Error>> + Send + '_;

  fn get_model(
    &self,
    model_version: String,
  ) -> impl Future<Output = Result<Option<ModelMetadata>, Self::Error>> + Send + '_;

  /// The model new scores are written under, if any has been registered.
  fn current_model(
    &self,
  ) -> impl Future<Output = Result<Option<ModelMetadata>, Self::Error>> + Send + '_;

  /// Make `model_version` current. Past scores keep their own version.
  fn activate_model(
    &self,
    model_version: String,
  ) -> impl Future<Output = Result<ModelMetadata, Self::Error>> + Send + '_;

  // ── Alerts ────────────────────────────────────────────────────────────

  fn add_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<AlertSubscription, Self::Error>> + Send + '_;

  fn list_subscriptions(
    &self,
    issuer_id: Option<Uuid>,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<AlertSubscription>, Self::Error>> + Send + '_;

  fn deactivate_subscription(
    &self,
    subscription_id: Uuid,
  ) -> impl Future<Output = Result<AlertSubscription, Self::Error>> + Send + '_;

  /// Atomically write `alert` unless the same subscription already has an
  /// alert whose `triggered_at` lies within `window` of this one. Returns
  /// `None` when suppressed.
  fn insert_alert_if_absent(
    &self,
    alert: NewAlert,
    window: Duration,
  ) -> impl Future<Output = Result<Option<AlertHistory>, Self::Error>> + Send + '_;

  /// Alerts triggered at or after `since`, newest first, joined with issuer
  /// and subscription identity.
  fn recent_alerts(
    &self,
    since: DateTime<Utc>,
    issuer_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<AlertRecord>, Self::Error>> + Send + '_;
}

/// Lift a backend result into the core error taxonomy.
pub trait StoreResultExt<T> {
  fn lift(self) -> crate::Result<T>;
}

impl<T, E: Into<crate::Error>> StoreResultExt<T> for Result<T, E> {
  fn lift(self) -> crate::Result<T> { self.map_err(Into::into) }
}
