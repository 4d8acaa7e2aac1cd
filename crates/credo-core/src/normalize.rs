//! Feature normalisation: raw observations to bounded 0-100 sub-scores.
//!
//! Sub-scores are independent of pillar weights; the composer applies those.
//! A missing required input is an error, never a silently substituted
//! default, because the explanation must describe exactly what was scored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  observation::{FeatureSnapshot, MacroObservation, PriceObservation},
};

/// Number of trailing price bars the market sub-score looks at.
pub const MARKET_WINDOW: usize = 31;
const MIN_PRICE_OBSERVATIONS: usize = 2;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A neutral sub-score: neither helps nor hurts.
pub const NEUTRAL_SUBSCORE: f64 = 50.0;

// ─── Base fundamentals ───────────────────────────────────────────────────────

struct BaseFeature {
  name:      &'static str,
  weight:    f64,
  required:  bool,
  transform: fn(f64) -> f64,
}

/// Interest coverage: logistic around 2x.
fn icr_transform(x: f64) -> f64 {
  1.0 / (1.0 + (-0.2 * (x.clamp(-10.0, 50.0) - 2.0)).exp())
}

/// Leverage: monotonically decreasing in debt / EBITDA.
fn leverage_transform(x: f64) -> f64 { 1.0 - (x.clamp(0.0, 50.0) / 10.0).tanh() }

fn liquidity_transform(x: f64) -> f64 { x.clamp(0.0, 10.0) / 10.0 }

fn growth_transform(x: f64) -> f64 { 0.5 + 0.5 * (x / 0.25).tanh() }

/// Altman Z centred on the 1.8 distress boundary.
fn altman_transform(x: f64) -> f64 { 0.5 + 0.5 * ((x - 1.8) / 1.5).tanh() }

/// Fundamentals feeding the base pillar. Optional entries are dropped when
/// absent and the remaining weights are renormalised.
const BASE_FEATURES: [BaseFeature; 5] = [
  BaseFeature {
    name:      "icr",
    weight:    0.30,
    required:  true,
    transform: icr_transform,
  },
  BaseFeature {
    name:      "debt_to_ebitda",
    weight:    0.25,
    required:  true,
    transform: leverage_transform,
  },
  BaseFeature {
    name:      "current_ratio",
    weight:    0.20,
    required:  true,
    transform: liquidity_transform,
  },
  BaseFeature {
    name:      "rev_yoy",
    weight:    0.15,
    required:  false,
    transform: growth_transform,
  },
  BaseFeature {
    name:      "altman_z",
    weight:    0.10,
    required:  false,
    transform: altman_transform,
  },
];

/// One fundamental as it entered the base sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFeature {
  pub name:       String,
  pub value:      f64,
  /// Transformed value in `[0, 1]`.
  pub normalized: f64,
  /// Effective weight after renormalisation over present features.
  pub weight:     f64,
  pub as_of:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSubscore {
  pub subscore: f64,
  pub features: Vec<NormalizedFeature>,
}

/// The most recent snapshot per feature name with `ts <= cutoff`. When two
/// rows share a timestamp, the later one in `snapshots` wins.
pub fn latest_per_feature(
  snapshots: &[FeatureSnapshot],
  cutoff: DateTime<Utc>,
) -> BTreeMap<&str, &FeatureSnapshot> {
  let mut latest: BTreeMap<&str, &FeatureSnapshot> = BTreeMap::new();
  for snap in snapshots.iter().filter(|s| s.ts <= cutoff) {
    match latest.get(snap.feature_name.as_str()) {
      Some(existing) if existing.ts > snap.ts => {}
      _ => {
        latest.insert(snap.feature_name.as_str(), snap);
      }
    }
  }
  latest
}

/// Base fundamentals sub-score in `[0, 100]`.
pub fn base_subscore(
  issuer_id: Uuid,
  snapshots: &[FeatureSnapshot],
  cutoff: DateTime<Utc>,
) -> Result<BaseSubscore> {
  let latest = latest_per_feature(snapshots, cutoff);

  let present: Vec<(&BaseFeature, &FeatureSnapshot)> = BASE_FEATURES
    .iter()
    .filter_map(|f| {
      latest
        .get(f.name)
        .filter(|s| s.value.is_finite())
        .map(|s| (f, *s))
    })
    .collect();

  let missing: Vec<String> = BASE_FEATURES
    .iter()
    .filter(|f| f.required)
    .filter(|f| !present.iter().any(|(p, _)| p.name == f.name))
    .map(|f| f.name.to_owned())
    .collect();
  if !missing.is_empty() {
    return Err(Error::IncompleteFeatureSet { issuer_id, missing });
  }

  let total_weight: f64 = present.iter().map(|(f, _)| f.weight).sum();
  let features: Vec<NormalizedFeature> = present
    .iter()
    .map(|(f, snap)| NormalizedFeature {
      name:       f.name.to_owned(),
      value:      snap.value,
      normalized: (f.transform)(snap.value).clamp(0.0, 1.0),
      weight:     f.weight / total_weight,
      as_of:      snap.ts,
    })
    .collect();

  let subscore = 100.0
    * features
      .iter()
      .map(|f| f.normalized * f.weight)
      .sum::<f64>();

  Ok(BaseSubscore {
    subscore: subscore.clamp(0.0, 100.0),
    features,
  })
}

// ─── Market ──────────────────────────────────────────────────────────────────

/// Raw market signals derived from the trailing price window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSignals {
  /// Annualised standard deviation of daily log returns.
  pub volatility:    f64,
  pub period_return: f64,
  /// Largest peak-to-trough decline, as a fraction of the peak.
  pub max_drawdown:  f64,
  /// Latest volume over mean volume across the window.
  pub volume_ratio:  f64,
  pub observations:  usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSubscore {
  pub subscore: f64,
  pub signals:  MarketSignals,
}

/// Market sub-score in `[0, 100]`; calm, flat trading scores 85 and 50 is
/// neutral.
pub fn market_subscore(
  issuer_id: Uuid,
  prices: &[PriceObservation],
  cutoff: DateTime<Utc>,
) -> Result<MarketSubscore> {
  let mut window: Vec<&PriceObservation> = prices
    .iter()
    .filter(|p| p.ts <= cutoff && p.adj_close.is_finite() && p.adj_close > 0.0)
    .collect();
  window.sort_by_key(|p| p.ts);
  let excess = window.len().saturating_sub(MARKET_WINDOW);
  window.drain(..excess);

  if window.len() < MIN_PRICE_OBSERVATIONS {
    return Err(Error::IncompleteFeatureSet {
      issuer_id,
      missing: vec!["price_history".to_owned()],
    });
  }

  let closes: Vec<f64> = window.iter().map(|p| p.adj_close).collect();
  let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

  let mean = returns.iter().sum::<f64>() / returns.len() as f64;
  let variance = if returns.len() > 1 {
    returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
      / (returns.len() - 1) as f64
  } else {
    0.0
  };
  let volatility = variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();

  let first = closes[0];
  let last = closes[closes.len() - 1];
  let period_return = last / first - 1.0;

  let mut peak = first;
  let mut max_drawdown: f64 = 0.0;
  for &close in &closes {
    peak = peak.max(close);
    max_drawdown = max_drawdown.max((peak - close) / peak);
  }

  let volumes: Vec<f64> = window
    .iter()
    .map(|p| if p.volume.is_finite() { p.volume.max(0.0) } else { 0.0 })
    .collect();
  let mean_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
  let volume_ratio = if mean_volume > 0.0 {
    volumes[volumes.len() - 1] / mean_volume
  } else {
    1.0
  };

  let signals = MarketSignals {
    volatility,
    period_return,
    max_drawdown,
    volume_ratio,
    observations: window.len(),
  };

  let s_vol = 1.0 - (volatility / 0.5).tanh();
  let s_ret = 0.5 + 0.5 * (period_return / 0.2).tanh();
  let s_dd = 1.0 - max_drawdown.clamp(0.0, 1.0).sqrt();
  let s_volume = 1.0 - ((volume_ratio - 1.0).max(0.0) / 2.0).tanh();

  let subscore =
    100.0 * (0.40 * s_vol + 0.30 * s_ret + 0.20 * s_dd + 0.10 * s_volume);

  Ok(MarketSubscore {
    subscore: subscore.clamp(0.0, 100.0),
    signals,
  })
}

// ─── Macro ───────────────────────────────────────────────────────────────────

const MACRO_ADJUSTMENT_BOUND: f64 = 0.30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroAdjustment {
  pub key:        String,
  pub value:      f64,
  pub adjustment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSubscore {
  pub subscore:    f64,
  pub adjustments: Vec<MacroAdjustment>,
}

fn macro_rule(key: &str, value: f64) -> Option<f64> {
  match key {
    "cpi_yoy" => Some(if value > 3.0 { -0.10 } else { 0.0 }),
    "pmi" => Some(if value > 50.0 { 0.10 } else { -0.10 }),
    "policy_rate" => Some(if value > 5.0 { -0.05 } else { 0.0 }),
    "gdp_growth" => Some(if value > 2.0 { 0.10 } else { -0.10 }),
    _ => None,
  }
}

/// Macro sub-score in `[0, 100]` from the latest reading per indicator.
/// Unknown indicators are ignored; no data at all is neutral.
pub fn macro_subscore(
  observations: &[MacroObservation],
  cutoff: DateTime<Utc>,
) -> MacroSubscore {
  let mut latest: BTreeMap<&str, &MacroObservation> = BTreeMap::new();
  for obs in observations
    .iter()
    .filter(|o| o.ts <= cutoff && o.value.is_finite())
  {
    match latest.get(obs.key.as_str()) {
      Some(existing) if existing.ts > obs.ts => {}
      _ => {
        latest.insert(obs.key.as_str(), obs);
      }
    }
  }

  let adjustments: Vec<MacroAdjustment> = latest
    .values()
    .filter_map(|obs| {
      macro_rule(&obs.key, obs.value).map(|adjustment| MacroAdjustment {
        key: obs.key.clone(),
        value: obs.value,
        adjustment,
      })
    })
    .collect();

  let total = adjustments
    .iter()
    .map(|a| a.adjustment)
    .sum::<f64>()
    .clamp(-MACRO_ADJUSTMENT_BOUND, MACRO_ADJUSTMENT_BOUND);

  MacroSubscore {
    subscore: NEUTRAL_SUBSCORE * (1.0 + total / MACRO_ADJUSTMENT_BOUND),
    adjustments,
  }
}
