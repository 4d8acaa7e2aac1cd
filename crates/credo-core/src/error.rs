//! Error types for `credo-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A required fundamental or market input is missing at the cutoff. The
  /// cycle for this issuer is skipped; nothing is written.
  #[error("incomplete feature set for issuer {issuer_id}: missing {missing:?}")]
  IncompleteFeatureSet {
    issuer_id: Uuid,
    missing:   Vec<String>,
  },

  /// The model configuration itself is broken. Fatal for the whole run.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The same content was ingested more than once. Logged and excluded from
  /// the event pillar; never propagated as a cycle failure.
  #[error("duplicate event ingestion: content hash {content_hash}")]
  DuplicateEventIngestion { content_hash: String },

  /// The cutoff precedes the issuer's latest score. Score history only
  /// grows forward, so the cycle is refused and no alert is evaluated.
  #[error("cutoff {cutoff} for issuer {issuer_id} precedes its latest score at {latest}")]
  StaleCutoff {
    issuer_id: Uuid,
    cutoff:    DateTime<Utc>,
    latest:    DateTime<Utc>,
  },

  #[error("issuer not found: {0}")]
  IssuerNotFound(Uuid),

  #[error("ticker already registered: {0:?}")]
  DuplicateTicker(String),

  #[error("subscription not found: {0}")]
  SubscriptionNotFound(Uuid),

  /// Caller-supplied input failed validation.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("no model version is currently active")]
  NoActiveModel,

  #[error("model version not found: {0:?}")]
  ModelNotFound(String),

  #[error("model version already registered: {0:?}")]
  ModelVersionExists(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error raised while talking to a
  /// [`CreditStore`](crate::store::CreditStore).
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether this error must abort the entire scoring run rather than just
  /// the current issuer's cycle.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Configuration(_) | Self::NoActiveModel)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
