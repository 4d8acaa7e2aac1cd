//! Issuer: the immutable reference entity that owns every time series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked debt issuer. Never mutated after creation; all observations,
/// events, scores, and subscriptions reference it by `issuer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
  pub issuer_id:  Uuid,
  pub name:       String,
  pub ticker:     Option<String>,
  /// SEC Central Index Key, when the issuer files with EDGAR.
  pub cik:        Option<String>,
  pub sector:     Option<String>,
  pub country:    String,
  pub created_at: DateTime<Utc>,
}

impl Issuer {
  /// The label used in alert messages and summaries: ticker if known,
  /// otherwise the legal name.
  pub fn display_label(&self) -> &str {
    self.ticker.as_deref().unwrap_or(&self.name)
  }
}

/// Input to [`crate::store::CreditStore::add_issuer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssuer {
  pub name:    String,
  pub ticker:  Option<String>,
  pub cik:     Option<String>,
  pub sector:  Option<String>,
  #[serde(default = "default_country")]
  pub country: String,
}

fn default_country() -> String { "US".to_owned() }

impl NewIssuer {
  /// Convenience constructor with all optional fields unset.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:    name.into(),
      ticker:  None,
      cik:     None,
      sector:  None,
      country: default_country(),
    }
  }

  pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
    self.ticker = Some(ticker.into());
    self
  }

  pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
    self.sector = Some(sector.into());
    self
  }
}
