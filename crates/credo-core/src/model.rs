//! Model metadata: the versioned configuration every score is computed
//! under.
//!
//! Exactly one model version is "current" at a time. Historical scores keep
//! the version that produced them; switching versions never rewrites them.
//! A [`ModelMetadata`] is turned into a validated [`ScoringConfig`] once per
//! run and threaded explicitly through every cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  bucket::{BucketScale, Breakpoint},
  decay::DecayConfig,
};

pub const DEFAULT_HALF_LIFE_HOURS: f64 = 7.0 * 24.0;
pub const DEFAULT_SIGNIFICANCE_FLOOR: f64 = 0.1;
/// Bound on the summed active-event contribution, before the event pillar
/// weight is applied.
pub const DEFAULT_MAX_DAILY_EVENT_IMPACT: f64 = 100.0;
pub const DEFAULT_MAX_ACTIVE_EVENTS: usize = 50;
pub const DEFAULT_TOP_FEATURES: usize = 5;
pub const DEFAULT_EVENT_TYPE_WEIGHT: f64 = 4.0;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ─── Pillar weights ──────────────────────────────────────────────────────────

/// The maximum share of the 0-100 scale each pillar may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarWeights {
  pub base:          f64,
  pub market:        f64,
  pub event:         f64,
  #[serde(rename = "macro")]
  pub macroeconomic: f64,
}

impl Default for PillarWeights {
  fn default() -> Self {
    Self {
      base:          0.55,
      market:        0.25,
      event:         0.12,
      macroeconomic: 0.08,
    }
  }
}

impl PillarWeights {
  fn validate(&self) -> Result<()> {
    let all = [
      ("base", self.base),
      ("market", self.market),
      ("event", self.event),
      ("macro", self.macroeconomic),
    ];
    for (name, w) in all {
      if !w.is_finite() || w < 0.0 {
        return Err(Error::Configuration(format!(
          "pillar weight {name} = {w} must be a non-negative number"
        )));
      }
    }
    let sum: f64 = all.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(Error::Configuration(format!(
        "pillar weights sum to {sum}, expected 1.0"
      )));
    }
    Ok(())
  }
}

// ─── Feature importance ──────────────────────────────────────────────────────

/// How a base-pillar feature is attributed in explanations:
/// `impact = (value - baseline) * importance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
  pub baseline:   f64,
  pub importance: f64,
}

impl FeatureImportance {
  pub fn new(baseline: f64, importance: f64) -> Self {
    Self { baseline, importance }
  }

  pub fn impact(&self, value: f64) -> f64 {
    (value - self.baseline) * self.importance
  }
}

/// Attribution defaults for the five base-pillar fundamentals.
pub fn default_feature_importance() -> BTreeMap<String, FeatureImportance> {
  BTreeMap::from([
    ("icr".to_owned(), FeatureImportance::new(3.0, 1.2)),
    ("debt_to_ebitda".to_owned(), FeatureImportance::new(3.0, -1.5)),
    ("current_ratio".to_owned(), FeatureImportance::new(1.5, 2.0)),
    ("rev_yoy".to_owned(), FeatureImportance::new(0.0, 10.0)),
    ("altman_z".to_owned(), FeatureImportance::new(1.8, 1.5)),
  ])
}

/// Severity per event type. Sentiment supplies the direction.
pub fn default_event_type_weights() -> BTreeMap<String, f64> {
  BTreeMap::from([
    ("bankruptcy".to_owned(), 30.0),
    ("downgrade".to_owned(), 15.0),
    ("restructuring".to_owned(), 12.0),
    ("regulatory_investigation".to_owned(), 10.0),
    ("guidance_cut".to_owned(), 9.0),
    ("earnings".to_owned(), 8.0),
    ("dividend_cut".to_owned(), 7.0),
    ("management_change".to_owned(), 6.0),
    ("acquisition".to_owned(), 5.0),
  ])
}

// ─── Hyperparameters ─────────────────────────────────────────────────────────

/// Raw hyperparameters as registered. Semantically load-bearing entries
/// (pillar weights, half-life, type weights) are optional here so that a
/// model registered without them fails validation instead of silently
/// picking up defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
  #[serde(default)]
  pub pillar_weights:         Option<PillarWeights>,
  #[serde(default)]
  pub half_life_hours:        Option<f64>,
  #[serde(default)]
  pub event_type_weights:     Option<BTreeMap<String, f64>>,
  #[serde(default = "default_event_type_weight")]
  pub default_event_weight:   f64,
  #[serde(default = "default_significance_floor")]
  pub significance_floor:     f64,
  #[serde(default = "default_max_daily_event_impact")]
  pub max_daily_event_impact: f64,
  #[serde(default = "default_max_active_events")]
  pub max_active_events:      usize,
  #[serde(default = "default_top_features")]
  pub top_features:           usize,
  /// Rating breakpoints; the standard AAA to CCC scale when absent.
  #[serde(default)]
  pub buckets:                Option<Vec<Breakpoint>>,
}

fn default_event_type_weight() -> f64 { DEFAULT_EVENT_TYPE_WEIGHT }
fn default_significance_floor() -> f64 { DEFAULT_SIGNIFICANCE_FLOOR }
fn default_max_daily_event_impact() -> f64 { DEFAULT_MAX_DAILY_EVENT_IMPACT }
fn default_max_active_events() -> usize { DEFAULT_MAX_ACTIVE_EVENTS }
fn default_top_features() -> usize { DEFAULT_TOP_FEATURES }

impl Hyperparameters {
  /// A fully-populated parameter set using the standard defaults.
  pub fn recommended() -> Self {
    Self {
      pillar_weights:         Some(PillarWeights::default()),
      half_life_hours:        Some(DEFAULT_HALF_LIFE_HOURS),
      event_type_weights:     Some(default_event_type_weights()),
      default_event_weight:   DEFAULT_EVENT_TYPE_WEIGHT,
      significance_floor:     DEFAULT_SIGNIFICANCE_FLOOR,
      max_daily_event_impact: DEFAULT_MAX_DAILY_EVENT_IMPACT,
      max_active_events:      DEFAULT_MAX_ACTIVE_EVENTS,
      top_features:           DEFAULT_TOP_FEATURES,
      buckets:                None,
    }
  }
}

// ─── ModelMetadata ───────────────────────────────────────────────────────────

/// A registered model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  pub model_version:      String,
  pub model_type:         String,
  pub hyperparameters:    Hyperparameters,
  pub feature_importance: BTreeMap<String, FeatureImportance>,
  pub registered_at:      DateTime<Utc>,
}

/// Input to [`crate::store::CreditStore::register_model`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModel {
  pub model_version:      String,
  pub model_type:         String,
  pub hyperparameters:    Hyperparameters,
  #[serde(default)]
  pub feature_importance: BTreeMap<String, FeatureImportance>,
}

impl NewModel {
  /// A model using the recommended hyperparameters and attribution table.
  pub fn baseline(model_version: impl Into<String>) -> Self {
    Self {
      model_version:      model_version.into(),
      model_type:         "weighted_additive".to_owned(),
      hyperparameters:    Hyperparameters::recommended(),
      feature_importance: default_feature_importance(),
    }
  }

  /// Validate without persisting anything.
  pub fn validate(&self) -> Result<()> {
    if self.model_version.trim().is_empty() {
      return Err(Error::Configuration("model_version is blank".into()));
    }
    build_config(
      &self.model_version,
      &self.hyperparameters,
      &self.feature_importance,
    )
    .map(|_| ())
  }
}

impl ModelMetadata {
  /// Validate the hyperparameters and produce the config a scoring cycle
  /// runs under. Any missing or malformed entry is a
  /// [`Error::Configuration`].
  pub fn scoring_config(&self) -> Result<ScoringConfig> {
    build_config(
      &self.model_version,
      &self.hyperparameters,
      &self.feature_importance,
    )
  }
}

// ─── ScoringConfig ───────────────────────────────────────────────────────────

/// Everything a scoring cycle needs from the active model, validated.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
  pub model_version:      String,
  pub weights:            PillarWeights,
  pub decay:              DecayConfig,
  pub buckets:            BucketScale,
  pub top_features:       usize,
  pub feature_importance: BTreeMap<String, FeatureImportance>,
}

impl ScoringConfig {
  /// The config for [`NewModel::baseline`], for tests and first boot.
  pub fn recommended(model_version: impl Into<String>) -> Self {
    Self {
      model_version:      model_version.into(),
      weights:            PillarWeights::default(),
      decay:              DecayConfig::recommended(),
      buckets:            BucketScale::default(),
      top_features:       DEFAULT_TOP_FEATURES,
      feature_importance: default_feature_importance(),
    }
  }
}

fn build_config(
  model_version: &str,
  hp: &Hyperparameters,
  feature_importance: &BTreeMap<String, FeatureImportance>,
) -> Result<ScoringConfig> {
  let weights = hp
    .pillar_weights
    .ok_or_else(|| Error::Configuration("pillar weights are missing".into()))?;
  weights.validate()?;

  let half_life_hours = hp
    .half_life_hours
    .ok_or_else(|| Error::Configuration("decay half-life is missing".into()))?;
  let type_weights = hp.event_type_weights.clone().ok_or_else(|| {
    Error::Configuration("event type-weight map is missing".into())
  })?;

  let decay = DecayConfig::new(
    half_life_hours,
    hp.significance_floor,
    type_weights,
    hp.default_event_weight,
    hp.max_daily_event_impact,
    hp.max_active_events,
  )?;

  let buckets = match &hp.buckets {
    Some(bps) => BucketScale::new(bps.clone())?,
    None => BucketScale::default(),
  };

  if hp.top_features == 0 {
    return Err(Error::Configuration("top_features must be at least 1".into()));
  }

  for (name, fi) in feature_importance {
    if !fi.baseline.is_finite() || !fi.importance.is_finite() {
      return Err(Error::Configuration(format!(
        "feature importance for {name:?} is not finite"
      )));
    }
  }

  Ok(ScoringConfig {
    model_version: model_version.to_owned(),
    weights,
    decay,
    buckets,
    top_features: hp.top_features,
    feature_importance: feature_importance.clone(),
  })
}
