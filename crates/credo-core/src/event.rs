//! Discrete news and filing events.
//!
//! An event row is an immutable record of what was ingested and when. Its
//! remaining influence is never stored: the decay factor is recomputed on
//! every read from the elapsed time (see [`crate::decay`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:     Uuid,
  pub issuer_id:    Uuid,
  /// When the event happened; the decay clock starts here.
  pub ts:           DateTime<Utc>,
  /// Classifier label such as `earnings` or `downgrade`.
  pub event_type:   String,
  /// Direction and strength of the news, in `[-1, 1]`.
  pub sentiment:    f64,
  /// Base weight assigned by the ingesting connector. Kept for audit.
  pub weight:       f64,
  pub headline:     String,
  pub url:          Option<String>,
  /// Digest of the ingested content; used to spot re-ingestion.
  pub content_hash: String,
  pub source:       Option<String>,
}

/// Input to [`crate::store::CreditStore::record_event`].
///
/// `content_hash` may be omitted; the store then derives one from the
/// headline and URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
  pub issuer_id:    Uuid,
  pub ts:           DateTime<Utc>,
  #[serde(rename = "type")]
  pub event_type:   String,
  pub sentiment:    f64,
  pub weight:       f64,
  pub headline:     String,
  pub url:          Option<String>,
  pub content_hash: Option<String>,
  pub source:       Option<String>,
}

impl NewEvent {
  /// Sentiment clamped into `[-1, 1]`; connectors occasionally overshoot.
  pub fn clamped_sentiment(&self) -> f64 {
    if self.sentiment.is_finite() {
      self.sentiment.clamp(-1.0, 1.0)
    } else {
      0.0
    }
  }
}
