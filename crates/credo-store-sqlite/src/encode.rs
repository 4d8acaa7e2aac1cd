//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix. Explanations, hyperparameters, and feature
//! importance tables are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use credo_core::{
  alert::{AlertHistory, AlertRecord, AlertSubscription, AlertType},
  event::Event,
  explain::Explanation,
  issuer::Issuer,
  model::ModelMetadata,
  observation::{FeatureSnapshot, MacroObservation, PriceObservation},
  score::{PillarBreakdown, Score},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AlertType ───────────────────────────────────────────────────────────────

pub fn encode_alert_type(t: AlertType) -> String { t.to_string() }

pub fn decode_alert_type(s: &str) -> Result<AlertType> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown alert type: {s:?}")))
}

// ─── Content hash ────────────────────────────────────────────────────────────

/// Fallback digest for events ingested without a content hash:
/// `sha256(headline + "\n" + url)`, hex-encoded.
pub fn content_hash(headline: &str, url: Option<&str>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(headline.as_bytes());
  hasher.update(b"\n");
  hasher.update(url.unwrap_or_default().as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ISSUER_COLUMNS: &str =
  "issuer_id, name, ticker, cik, sector, country, created_at";

/// Raw strings read directly from an `issuers` row.
pub struct RawIssuer {
  pub issuer_id:  String,
  pub name:       String,
  pub ticker:     Option<String>,
  pub cik:        Option<String>,
  pub sector:     Option<String>,
  pub country:    String,
  pub created_at: String,
}

impl RawIssuer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      issuer_id:  row.get(0)?,
      name:       row.get(1)?,
      ticker:     row.get(2)?,
      cik:        row.get(3)?,
      sector:     row.get(4)?,
      country:    row.get(5)?,
      created_at: row.get(6)?,
    })
  }

  pub fn into_issuer(self) -> Result<Issuer> {
    Ok(Issuer {
      issuer_id:  decode_uuid(&self.issuer_id)?,
      name:       self.name,
      ticker:     self.ticker,
      cik:        self.cik,
      sector:     self.sector,
      country:    self.country,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const FEATURE_COLUMNS: &str =
  "snapshot_id, issuer_id, ts, feature_name, value, source";

pub struct RawFeature {
  pub snapshot_id:  String,
  pub issuer_id:    String,
  pub ts:           String,
  pub feature_name: String,
  pub value:        f64,
  pub source:       Option<String>,
}

impl RawFeature {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:  row.get(0)?,
      issuer_id:    row.get(1)?,
      ts:           row.get(2)?,
      feature_name: row.get(3)?,
      value:        row.get(4)?,
      source:       row.get(5)?,
    })
  }

  pub fn into_feature(self) -> Result<FeatureSnapshot> {
    Ok(FeatureSnapshot {
      snapshot_id:  decode_uuid(&self.snapshot_id)?,
      issuer_id:    decode_uuid(&self.issuer_id)?,
      ts:           decode_dt(&self.ts)?,
      feature_name: self.feature_name,
      value:        self.value,
      source:       self.source,
    })
  }
}

pub const PRICE_COLUMNS: &str =
  "price_id, issuer_id, ts, open, high, low, close, volume, adj_close";

pub struct RawPrice {
  pub price_id:  String,
  pub issuer_id: String,
  pub ts:        String,
  pub ohlcv:     [f64; 6],
}

impl RawPrice {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      price_id:  row.get(0)?,
      issuer_id: row.get(1)?,
      ts:        row.get(2)?,
      ohlcv:     [
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
      ],
    })
  }

  pub fn into_price(self) -> Result<PriceObservation> {
    let [open, high, low, close, volume, adj_close] = self.ohlcv;
    Ok(PriceObservation {
      price_id: decode_uuid(&self.price_id)?,
      issuer_id: decode_uuid(&self.issuer_id)?,
      ts: decode_dt(&self.ts)?,
      open,
      high,
      low,
      close,
      volume,
      adj_close,
    })
  }
}

pub const MACRO_COLUMNS: &str = "macro_id, ts, key, value, source";

pub struct RawMacro {
  pub macro_id: String,
  pub ts:       String,
  pub key:      String,
  pub value:    f64,
  pub source:   Option<String>,
}

impl RawMacro {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      macro_id: row.get(0)?,
      ts:       row.get(1)?,
      key:      row.get(2)?,
      value:    row.get(3)?,
      source:   row.get(4)?,
    })
  }

  pub fn into_macro(self) -> Result<MacroObservation> {
    Ok(MacroObservation {
      macro_id: decode_uuid(&self.macro_id)?,
      ts:       decode_dt(&self.ts)?,
      key:      self.key,
      value:    self.value,
      source:   self.source,
    })
  }
}

pub const EVENT_COLUMNS: &str = "event_id, issuer_id, ts, event_type, sentiment, \
                                 weight, headline, url, content_hash, source";

pub struct RawEvent {
  pub event_id:     String,
  pub issuer_id:    String,
  pub ts:           String,
  pub event_type:   String,
  pub sentiment:    f64,
  pub weight:       f64,
  pub headline:     String,
  pub url:          Option<String>,
  pub content_hash: String,
  pub source:       Option<String>,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:     row.get(0)?,
      issuer_id:    row.get(1)?,
      ts:           row.get(2)?,
      event_type:   row.get(3)?,
      sentiment:    row.get(4)?,
      weight:       row.get(5)?,
      headline:     row.get(6)?,
      url:          row.get(7)?,
      content_hash: row.get(8)?,
      source:       row.get(9)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:     decode_uuid(&self.event_id)?,
      issuer_id:    decode_uuid(&self.issuer_id)?,
      ts:           decode_dt(&self.ts)?,
      event_type:   self.event_type,
      sentiment:    self.sentiment,
      weight:       self.weight,
      headline:     self.headline,
      url:          self.url,
      content_hash: self.content_hash,
      source:       self.source,
    })
  }
}

pub const SCORE_COLUMNS: &str = "score_id, issuer_id, ts, score, bucket, base, \
                                 market, event_delta, macro_adj, model_version, \
                                 explanation_json";

pub struct RawScore {
  pub score_id:         String,
  pub issuer_id:        String,
  pub ts:               String,
  pub score:            f64,
  pub bucket:           String,
  pub pillars:          [f64; 4],
  pub model_version:    String,
  pub explanation_json: String,
}

impl RawScore {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      score_id:         row.get(0)?,
      issuer_id:        row.get(1)?,
      ts:               row.get(2)?,
      score:            row.get(3)?,
      bucket:           row.get(4)?,
      pillars:          [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
      model_version:    row.get(9)?,
      explanation_json: row.get(10)?,
    })
  }

  pub fn into_score(self) -> Result<Score> {
    let [base, market, event_delta, macro_adj] = self.pillars;
    let explanation: Explanation = serde_json::from_str(&self.explanation_json)?;
    Ok(Score {
      score_id: decode_uuid(&self.score_id)?,
      issuer_id: decode_uuid(&self.issuer_id)?,
      ts: decode_dt(&self.ts)?,
      score: self.score,
      bucket: self.bucket,
      pillars: PillarBreakdown {
        base,
        market,
        event_delta,
        macro_adj,
      },
      model_version: self.model_version,
      explanation,
    })
  }
}

pub const MODEL_COLUMNS: &str = "model_version, model_type, hyperparameters_json, \
                                 feature_importance_json, registered_at";

pub struct RawModel {
  pub model_version:           String,
  pub model_type:              String,
  pub hyperparameters_json:    String,
  pub feature_importance_json: String,
  pub registered_at:           String,
}

impl RawModel {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      model_version:           row.get(0)?,
      model_type:              row.get(1)?,
      hyperparameters_json:    row.get(2)?,
      feature_importance_json: row.get(3)?,
      registered_at:           row.get(4)?,
    })
  }

  pub fn into_model(self) -> Result<ModelMetadata> {
    Ok(ModelMetadata {
      model_version:      self.model_version,
      model_type:         self.model_type,
      hyperparameters:    serde_json::from_str(&self.hyperparameters_json)?,
      feature_importance: serde_json::from_str(&self.feature_importance_json)?,
      registered_at:      decode_dt(&self.registered_at)?,
    })
  }
}

pub const SUBSCRIPTION_COLUMNS: &str =
  "subscription_id, issuer_id, threshold, active, email, webhook_url, created_at";

pub struct RawSubscription {
  pub subscription_id: String,
  pub issuer_id:       String,
  pub threshold:       f64,
  pub active:          bool,
  pub email:           Option<String>,
  pub webhook_url:     Option<String>,
  pub created_at:      String,
}

impl RawSubscription {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id: row.get(0)?,
      issuer_id:       row.get(1)?,
      threshold:       row.get(2)?,
      active:          row.get(3)?,
      email:           row.get(4)?,
      webhook_url:     row.get(5)?,
      created_at:      row.get(6)?,
    })
  }

  pub fn into_subscription(self) -> Result<AlertSubscription> {
    Ok(AlertSubscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      issuer_id:       decode_uuid(&self.issuer_id)?,
      threshold:       self.threshold,
      active:          self.active,
      email:           self.email,
      webhook_url:     self.webhook_url,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub const ALERT_COLUMNS: &str = "a.alert_id, a.subscription_id, a.issuer_id, \
                                 a.alert_type, a.message, a.score_change, \
                                 a.triggered_at";

pub struct RawAlert {
  pub alert_id:        String,
  pub subscription_id: String,
  pub issuer_id:       String,
  pub alert_type:      String,
  pub message:         String,
  pub score_change:    f64,
  pub triggered_at:    String,
}

impl RawAlert {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert_id:        row.get(0)?,
      subscription_id: row.get(1)?,
      issuer_id:       row.get(2)?,
      alert_type:      row.get(3)?,
      message:         row.get(4)?,
      score_change:    row.get(5)?,
      triggered_at:    row.get(6)?,
    })
  }

  pub fn into_alert(self) -> Result<AlertHistory> {
    Ok(AlertHistory {
      alert_id:        decode_uuid(&self.alert_id)?,
      subscription_id: decode_uuid(&self.subscription_id)?,
      issuer_id:       decode_uuid(&self.issuer_id)?,
      alert_type:      decode_alert_type(&self.alert_type)?,
      message:         self.message,
      score_change:    self.score_change,
      triggered_at:    decode_dt(&self.triggered_at)?,
    })
  }
}

/// An `alert_history` row joined with its issuer and subscription.
pub struct RawAlertRecord {
  pub alert:       RawAlert,
  pub issuer_name: String,
  pub ticker:      Option<String>,
  pub threshold:   f64,
}

impl RawAlertRecord {
  /// Expects [`ALERT_COLUMNS`] followed by `i.name, i.ticker, s.threshold`.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert:       RawAlert::from_row(row)?,
      issuer_name: row.get(7)?,
      ticker:      row.get(8)?,
      threshold:   row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<AlertRecord> {
    Ok(AlertRecord {
      alert:       self.alert.into_alert()?,
      issuer_name: self.issuer_name,
      ticker:      self.ticker,
      threshold:   self.threshold,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1500);
    let c = a + chrono::Duration::hours(20);
    let encoded: Vec<String> = [a, b, c].into_iter().map(encode_dt).collect();
    assert_eq!(encoded[0], "2024-01-01T09:00:00.000000Z");
    assert!(encoded[0] < encoded[1] && encoded[1] < encoded[2]);
    assert_eq!(decode_dt(&encoded[1]).unwrap(), b);
  }

  #[test]
  fn content_hash_is_stable_and_url_sensitive() {
    let a = content_hash("Acme misses estimates", Some("https://news/1"));
    assert_eq!(a, content_hash("Acme misses estimates", Some("https://news/1")));
    assert_ne!(a, content_hash("Acme misses estimates", Some("https://news/2")));
    assert_eq!(a.len(), 64);
    assert_eq!(
      content_hash("", None),
      "01ba4719c80b6fe911b091a7c05124b64eeece964e09c058ef8f9805daca546b"
    );
  }
}
