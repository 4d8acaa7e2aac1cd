//! Observation types produced by external ingestion.
//!
//! All three are append-only: a correction is a newer row, never an update.
//! "Latest" is always derived at read time from `ts`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Feature snapshots ───────────────────────────────────────────────────────

/// One named fundamental or derived feature for an issuer at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
  pub snapshot_id:  Uuid,
  pub issuer_id:    Uuid,
  pub ts:           DateTime<Utc>,
  pub feature_name: String,
  pub value:        f64,
  pub source:       Option<String>,
}

/// Input to [`crate::store::CreditStore::record_feature`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeatureSnapshot {
  pub issuer_id:    Uuid,
  pub ts:           DateTime<Utc>,
  pub feature_name: String,
  pub value:        f64,
  pub source:       Option<String>,
}

// ─── Prices ──────────────────────────────────────────────────────────────────

/// A daily OHLCV bar for an issuer's listed equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
  pub price_id:  Uuid,
  pub issuer_id: Uuid,
  pub ts:        DateTime<Utc>,
  pub open:      f64,
  pub high:      f64,
  pub low:       f64,
  pub close:     f64,
  pub volume:    f64,
  pub adj_close: f64,
}

/// Input to [`crate::store::CreditStore::record_price`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceObservation {
  pub issuer_id: Uuid,
  pub ts:        DateTime<Utc>,
  pub open:      f64,
  pub high:      f64,
  pub low:       f64,
  pub close:     f64,
  pub volume:    f64,
  pub adj_close: f64,
}

// ─── Macro ───────────────────────────────────────────────────────────────────

/// A macroeconomic indicator reading. Not issuer-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroObservation {
  pub macro_id: Uuid,
  pub ts:       DateTime<Utc>,
  pub key:      String,
  pub value:    f64,
  pub source:   Option<String>,
}

/// Input to [`crate::store::CreditStore::record_macro`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMacroObservation {
  pub ts:     DateTime<Utc>,
  pub key:    String,
  pub value:  f64,
  pub source: Option<String>,
}
