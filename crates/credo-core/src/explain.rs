//! Explainability: a deterministic attribution record for every score.
//!
//! The explanation is a pure function of the scored inputs and the model
//! configuration: the same inputs under the same model version serialise to
//! byte-identical JSON. The summary is produced by template substitution
//! keyed on the dominant driver; nothing here is generated text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  decay::EventImpact,
  issuer::Issuer,
  model::ScoringConfig,
  normalize::{BaseSubscore, MacroSubscore, MarketSubscore},
  score::PillarBreakdown,
};

// ─── Record ──────────────────────────────────────────────────────────────────

/// A base-pillar feature's attributed impact:
/// `(value - baseline) * importance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
  pub name:   String,
  pub value:  f64,
  pub impact: f64,
}

/// An active event that fed the event pillar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAttribution {
  pub event_id:     Uuid,
  #[serde(rename = "type")]
  pub event_type:   String,
  pub headline:     String,
  pub sentiment:    f64,
  pub decay_factor: f64,
  pub contribution: f64,
}

/// Unweighted sub-scores, kept so an auditor can re-apply the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubscoreSummary {
  pub base:              f64,
  pub market:            f64,
  #[serde(rename = "macro")]
  pub macroeconomic:     f64,
  pub event_sum:         f64,
  pub event_sum_clipped: f64,
}

/// What moved the score most.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Driver {
  Feature { name: String, impact: f64 },
  Events { count: usize, delta: f64 },
  Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
  pub model_version:       String,
  pub pillars:             PillarBreakdown,
  pub subscores:           SubscoreSummary,
  /// Top-N base-pillar features by descending absolute impact.
  pub top_features:        Vec<FeatureImpact>,
  pub events:              Vec<EventAttribution>,
  pub excluded_duplicates: usize,
  pub dominant:            Driver,
  pub summary:             String,
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// Everything the generator reads, as produced by the composer.
pub struct ExplainInputs<'a> {
  pub issuer:  &'a Issuer,
  pub score:   f64,
  pub bucket:  &'a str,
  pub pillars: PillarBreakdown,
  pub base:    &'a BaseSubscore,
  pub market:  &'a MarketSubscore,
  pub macros:  &'a MacroSubscore,
  pub events:  &'a EventImpact,
}

/// Rank base-pillar features that have an importance entry in the model.
/// Ties on magnitude are broken by name so the order is stable.
pub fn top_features(config: &ScoringConfig, base: &BaseSubscore) -> Vec<FeatureImpact> {
  let mut impacts: Vec<FeatureImpact> = base
    .features
    .iter()
    .filter_map(|f| {
      config.feature_importance.get(&f.name).map(|fi| FeatureImpact {
        name:   f.name.clone(),
        value:  f.value,
        impact: fi.impact(f.value),
      })
    })
    .collect();

  impacts.sort_by(|a, b| {
    b.impact
      .abs()
      .total_cmp(&a.impact.abs())
      .then_with(|| a.name.cmp(&b.name))
  });
  impacts.truncate(config.top_features);
  impacts
}

fn dominant_driver(top: &[FeatureImpact], events: &EventImpact, event_delta: f64) -> Driver {
  let feature = top.first().filter(|f| f.impact != 0.0);
  let events_matter = !events.active.is_empty() && event_delta != 0.0;

  match feature {
    Some(f) if !events_matter || f.impact.abs() >= event_delta.abs() => {
      Driver::Feature {
        name:   f.name.clone(),
        impact: f.impact,
      }
    }
    _ if events_matter => Driver::Events {
      count: events.active.len(),
      delta: event_delta,
    },
    _ => Driver::Balanced,
  }
}

fn driver_sentence(driver: &Driver) -> String {
  match driver {
    Driver::Feature { name, impact } if *impact >= 0.0 => {
      format!("Primary driver: {name} supports the score ({impact:+.2}).")
    }
    Driver::Feature { name, impact } => {
      format!("Primary driver: {name} weighs on the score ({impact:+.2}).")
    }
    Driver::Events { count, delta } => {
      let noun = if *count == 1 { "event" } else { "events" };
      let verb = if *delta >= 0.0 { "lifted" } else { "cut" };
      format!(
        "Primary driver: {count} active {noun} {verb} the score by {:.2} points.",
        delta.abs()
      )
    }
    Driver::Balanced => "No single feature or event dominates.".to_owned(),
  }
}

/// Build the explanation attached to a score.
pub fn explain(config: &ScoringConfig, inputs: &ExplainInputs<'_>) -> Explanation {
  let top = top_features(config, inputs.base);
  let dominant = dominant_driver(&top, inputs.events, inputs.pillars.event_delta);

  let events: Vec<EventAttribution> = inputs
    .events
    .active
    .iter()
    .map(|a| EventAttribution {
      event_id:     a.event.event_id,
      event_type:   a.event.event_type.clone(),
      headline:     a.event.headline.clone(),
      sentiment:    a.event.sentiment,
      decay_factor: a.decay_factor,
      contribution: a.contribution,
    })
    .collect();

  let p = &inputs.pillars;
  let mut summary = format!(
    "{label} scored {score:.1} ({bucket}) under model {version}: fundamentals \
     {base:.1}, market {market:.1}, events {event:+.1}, macro {macro_adj:.1}. {driver}",
    label = inputs.issuer.display_label(),
    score = inputs.score,
    bucket = inputs.bucket,
    version = config.model_version,
    base = p.base,
    market = p.market,
    event = p.event_delta,
    macro_adj = p.macro_adj,
    driver = driver_sentence(&dominant),
  );
  let excluded = inputs.events.duplicates.len();
  if excluded > 0 {
    summary.push_str(&format!(" {excluded} re-ingested event(s) excluded."));
  }

  Explanation {
    model_version: config.model_version.clone(),
    pillars: inputs.pillars,
    subscores: SubscoreSummary {
      base:              inputs.base.subscore,
      market:            inputs.market.subscore,
      macroeconomic:     inputs.macros.subscore,
      event_sum:         inputs.events.raw_sum,
      event_sum_clipped: inputs.events.clipped_sum,
    },
    top_features: top,
    events,
    excluded_duplicates: excluded,
    dominant,
    summary,
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::normalize::{MarketSignals, NormalizedFeature};

  fn issuer() -> Issuer {
    Issuer {
      issuer_id:  Uuid::nil(),
      name:       "Acme Holdings".into(),
      ticker:     Some("ACME".into()),
      cik:        None,
      sector:     Some("Industrials".into()),
      country:    "US".into(),
      created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn feature(name: &str, value: f64) -> NormalizedFeature {
    NormalizedFeature {
      name: name.into(),
      value,
      normalized: 0.5,
      weight: 0.2,
      as_of: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn base() -> BaseSubscore {
    BaseSubscore {
      subscore: 70.0,
      features: vec![
        feature("icr", 8.0),           // (8 - 3) * 1.2 = 6.0
        feature("debt_to_ebitda", 5.0), // (5 - 3) * -1.5 = -3.0
        feature("current_ratio", 1.5), // 0
        feature("unscored", 99.0),
      ],
    }
  }

  fn market() -> MarketSubscore {
    MarketSubscore {
      subscore: 60.0,
      signals:  MarketSignals {
        volatility:    0.2,
        period_return: 0.01,
        max_drawdown:  0.05,
        volume_ratio:  1.0,
        observations:  31,
      },
    }
  }

  fn macros() -> MacroSubscore {
    MacroSubscore {
      subscore:    50.0,
      adjustments: vec![],
    }
  }

  fn pillars() -> PillarBreakdown {
    PillarBreakdown {
      base:        38.5,
      market:      15.0,
      event_delta: 0.0,
      macro_adj:   4.0,
    }
  }

  #[test]
  fn top_features_ranked_by_absolute_impact() {
    let config = ScoringConfig::recommended("v1");
    let top = top_features(&config, &base());
    let names: Vec<_> = top.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["icr", "debt_to_ebitda", "current_ratio"]);
    assert!((top[0].impact - 6.0).abs() < 1e-9);
    assert!((top[1].impact + 3.0).abs() < 1e-9);
  }

  #[test]
  fn top_features_respects_limit() {
    let mut config = ScoringConfig::recommended("v1");
    config.top_features = 1;
    assert_eq!(top_features(&config, &base()).len(), 1);
  }

  #[test]
  fn explanation_is_byte_identical_across_runs() {
    let config = ScoringConfig::recommended("v1");
    let (issuer, base, market, macros) = (issuer(), base(), market(), macros());
    let events = EventImpact::default();
    let inputs = ExplainInputs {
      issuer:  &issuer,
      score:   57.5,
      bucket:  "BB",
      pillars: pillars(),
      base:    &base,
      market:  &market,
      macros:  &macros,
      events:  &events,
    };

    let a = serde_json::to_string(&explain(&config, &inputs)).unwrap();
    let b = serde_json::to_string(&explain(&config, &inputs)).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn summary_names_dominant_feature() {
    let config = ScoringConfig::recommended("v1");
    let (issuer, base, market, macros) = (issuer(), base(), market(), macros());
    let events = EventImpact::default();
    let explanation = explain(&config, &ExplainInputs {
      issuer:  &issuer,
      score:   57.5,
      bucket:  "BB",
      pillars: pillars(),
      base:    &base,
      market:  &market,
      macros:  &macros,
      events:  &events,
    });

    assert_eq!(
      explanation.dominant,
      Driver::Feature {
        name:   "icr".into(),
        impact: 6.0,
      }
    );
    assert_eq!(
      explanation.summary,
      "ACME scored 57.5 (BB) under model v1: fundamentals 38.5, market 15.0, \
       events +0.0, macro 4.0. Primary driver: icr supports the score (+6.00)."
    );
  }

  #[test]
  fn large_event_move_dominates() {
    let config = ScoringConfig::recommended("v1");
    let (issuer, base, market, macros) = (issuer(), base(), market(), macros());
    let event = crate::event::Event {
      event_id:     Uuid::nil(),
      issuer_id:    Uuid::nil(),
      ts:           Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      event_type:   "bankruptcy".into(),
      sentiment:    -1.0,
      weight:       -9.0,
      headline:     "Acme files for Chapter 11".into(),
      url:          None,
      content_hash: "abc".into(),
      source:       None,
    };
    let events = EventImpact {
      active:      vec![crate::decay::ActiveEvent {
        event,
        decay_factor: 1.0,
        type_weight:  30.0,
        contribution: -30.0,
      }],
      duplicates:  vec![],
      truncated:   0,
      raw_sum:     -30.0,
      clipped_sum: -30.0,
    };
    let mut p = pillars();
    p.event_delta = -7.2;

    let explanation = explain(&config, &ExplainInputs {
      issuer:  &issuer,
      score:   50.3,
      bucket:  "BB",
      pillars: p,
      base:    &base,
      market:  &market,
      macros:  &macros,
      events:  &events,
    });

    assert!(matches!(explanation.dominant, Driver::Events { count: 1, .. }));
    assert!(explanation.summary.ends_with(
      "Primary driver: 1 active event cut the score by 7.20 points."
    ));
    assert_eq!(explanation.events.len(), 1);
  }
}
