//! Score records.
//!
//! A score is written once per scoring cycle and never updated. The four
//! stored pillar values always reproduce the stored score after clipping, so
//! any historical score can be re-derived from its own row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::explain::Explanation;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// The four weighted pillar contributions, each already scaled into its
/// maximum budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarBreakdown {
  pub base:        f64,
  pub market:      f64,
  pub event_delta: f64,
  pub macro_adj:   f64,
}

impl PillarBreakdown {
  /// The unclipped sum of the pillars.
  pub fn total(&self) -> f64 {
    self.base + self.market + self.event_delta + self.macro_adj
  }

  /// The composite score: the pillar sum clipped to `[0, 100]`.
  pub fn composite(&self) -> f64 { self.total().clamp(SCORE_MIN, SCORE_MAX) }
}

/// A persisted score row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
  pub score_id:      Uuid,
  pub issuer_id:     Uuid,
  /// The cycle cutoff the score was computed as of.
  pub ts:            DateTime<Utc>,
  pub score:         f64,
  pub bucket:        String,
  #[serde(flatten)]
  pub pillars:       PillarBreakdown,
  pub model_version: String,
  pub explanation:   Explanation,
}

impl Score {
  /// Whether the stored pillars reproduce the stored score within
  /// `tolerance`.
  pub fn is_reconstructible(&self, tolerance: f64) -> bool {
    (self.pillars.composite() - self.score).abs() <= tolerance
  }
}

/// Input to [`crate::store::CreditStore::record_score`]; produced by
/// [`crate::compose::compose`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScore {
  pub issuer_id:     Uuid,
  pub ts:            DateTime<Utc>,
  pub score:         f64,
  pub bucket:        String,
  #[serde(flatten)]
  pub pillars:       PillarBreakdown,
  pub model_version: String,
  pub explanation:   Explanation,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn composite_matches_reference_rows() {
    let a = PillarBreakdown {
      base:        60.5,
      market:      12.8,
      event_delta: 8.5,
      macro_adj:   5.4,
    };
    assert!((a.composite() - 87.2).abs() < 1e-6);

    let b = PillarBreakdown {
      base:        61.8,
      market:      13.1,
      event_delta: 8.7,
      macro_adj:   4.9,
    };
    assert!((b.composite() - 88.5).abs() < 1e-6);
  }

  #[test]
  fn composite_is_clipped() {
    let high = PillarBreakdown {
      base:        55.0,
      market:      25.0,
      event_delta: 12.0,
      macro_adj:   8.0,
    };
    assert_eq!(high.composite(), 100.0);

    let low = PillarBreakdown {
      base:        0.0,
      market:      0.0,
      event_delta: -12.0,
      macro_adj:   0.0,
    };
    assert_eq!(low.composite(), 0.0);
    assert_eq!(low.total(), -12.0);
  }
}
