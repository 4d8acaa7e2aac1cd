//! Score composition: four weighted pillars into one bounded score.
//!
//! Each pillar is scaled into its maximum budget at the point its sub-score
//! is produced (`subscore * weight`), so with weights summing to 1 the pillar
//! sum can only leave `[0, 100]` through a negative event pillar. The
//! composite is the clipped sum; no second renormalisation pass exists.
//!
//! [`compose`] is a pure function of its inputs and the model config. Any
//! failing pillar aborts the whole composition, so a partial score can
//! never be produced.

use chrono::{DateTime, Utc};

use crate::{
  Result,
  decay::{self, EventImpact},
  event::Event,
  explain::{self, ExplainInputs},
  issuer::Issuer,
  model::ScoringConfig,
  normalize::{self, BaseSubscore, MacroSubscore, MarketSubscore},
  observation::{FeatureSnapshot, MacroObservation, PriceObservation},
  score::{NewScore, PillarBreakdown},
};

/// Materialised inputs for one issuer at one cutoff.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs<'a> {
  pub issuer:             &'a Issuer,
  pub features:           &'a [FeatureSnapshot],
  pub prices:             &'a [PriceObservation],
  pub events:             &'a [Event],
  pub macro_observations: &'a [MacroObservation],
  pub cutoff:             DateTime<Utc>,
}

/// Intermediate results, exposed for logging and tests.
#[derive(Debug, Clone)]
pub struct Composition {
  pub base:    BaseSubscore,
  pub market:  MarketSubscore,
  pub macros:  MacroSubscore,
  pub events:  EventImpact,
  pub pillars: PillarBreakdown,
}

/// Compute the sub-scores and weighted pillars without building a score.
pub fn pillars(config: &ScoringConfig, inputs: &ScoringInputs<'_>) -> Result<Composition> {
  let issuer_id = inputs.issuer.issuer_id;
  let base = normalize::base_subscore(issuer_id, inputs.features, inputs.cutoff)?;
  let market = normalize::market_subscore(issuer_id, inputs.prices, inputs.cutoff)?;
  let macros = normalize::macro_subscore(inputs.macro_observations, inputs.cutoff);
  let events = decay::assess(&config.decay, inputs.events, inputs.cutoff);

  let w = config.weights;
  let pillars = PillarBreakdown {
    base:        base.subscore * w.base,
    market:      market.subscore * w.market,
    event_delta: events.clipped_sum * w.event,
    macro_adj:   macros.subscore * w.macroeconomic,
  };

  Ok(Composition {
    base,
    market,
    macros,
    events,
    pillars,
  })
}

/// Produce the score row and its explanation for `inputs.cutoff`.
pub fn compose(config: &ScoringConfig, inputs: &ScoringInputs<'_>) -> Result<NewScore> {
  let c = pillars(config, inputs)?;
  let score = c.pillars.composite();
  let bucket = config.buckets.bucket_for(score).to_owned();

  let explanation = explain::explain(config, &ExplainInputs {
    issuer:  inputs.issuer,
    score,
    bucket:  &bucket,
    pillars: c.pillars,
    base:    &c.base,
    market:  &c.market,
    macros:  &c.macros,
    events:  &c.events,
  });

  Ok(NewScore {
    issuer_id: inputs.issuer.issuer_id,
    ts: inputs.cutoff,
    score,
    bucket,
    pillars: c.pillars,
    model_version: config.model_version.clone(),
    explanation,
  })
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::Error;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() }

  fn issuer() -> Issuer {
    Issuer {
      issuer_id:  Uuid::from_u128(7),
      name:       "Globex".into(),
      ticker:     Some("GBX".into()),
      cik:        None,
      sector:     None,
      country:    "US".into(),
      created_at: t0(),
    }
  }

  fn features(icr: f64) -> Vec<FeatureSnapshot> {
    [("icr", icr), ("debt_to_ebitda", 2.5), ("current_ratio", 1.6), ("altman_z", 3.1)]
      .into_iter()
      .map(|(name, value)| FeatureSnapshot {
        snapshot_id: Uuid::new_v4(),
        issuer_id: Uuid::from_u128(7),
        ts: t0() - Duration::days(30),
        feature_name: name.into(),
        value,
        source: Some("edgar".into()),
      })
      .collect()
  }

  fn prices() -> Vec<PriceObservation> {
    (0..31)
      .map(|n| {
        let close = 100.0 + (n as f64 * 0.7).sin();
        PriceObservation {
          price_id: Uuid::new_v4(),
          issuer_id: Uuid::from_u128(7),
          ts: t0() - Duration::days(31 - n),
          open: close,
          high: close + 1.0,
          low: close - 1.0,
          close,
          volume: 1_000_000.0,
          adj_close: close,
        }
      })
      .collect()
  }

  fn events(sentiment: f64, count: usize) -> Vec<Event> {
    (0..count)
      .map(|i| Event {
        event_id:     Uuid::from_u128(100 + i as u128),
        issuer_id:    Uuid::from_u128(7),
        ts:           t0() - Duration::hours(6),
        event_type:   "bankruptcy".into(),
        sentiment,
        weight:       -9.0,
        headline:     format!("headline {i}"),
        url:          None,
        content_hash: format!("hash-{i}"),
        source:       None,
      })
      .collect()
  }

  #[test]
  fn composed_score_is_bounded_and_reconstructible() {
    let config = ScoringConfig::recommended("v1");
    let issuer = issuer();
    let (features, prices) = (features(8.0), prices());

    for evs in [events(-1.0, 20), events(1.0, 20), vec![]] {
      let inputs = ScoringInputs {
        issuer:             &issuer,
        features:           &features,
        prices:             &prices,
        events:             &evs,
        macro_observations: &[],
        cutoff:             t0(),
      };
      let s = compose(&config, &inputs).unwrap();
      assert!((0.0..=100.0).contains(&s.score));
      assert!((s.pillars.composite() - s.score).abs() < 1e-6);
      assert_eq!(s.bucket, config.buckets.bucket_for(s.score));
      assert_eq!(s.explanation.pillars, s.pillars);
    }
  }

  #[test]
  fn pillars_respect_their_budgets() {
    let config = ScoringConfig::recommended("v1");
    let issuer = issuer();
    let (features, prices, evs) = (features(50.0), prices(), events(-1.0, 10));
    let c = pillars(&config, &ScoringInputs {
      issuer:             &issuer,
      features:           &features,
      prices:             &prices,
      events:             &evs,
      macro_observations: &[],
      cutoff:             t0(),
    })
    .unwrap();

    assert!(c.pillars.base <= 55.0 + 1e-9);
    assert!(c.pillars.market <= 25.0 + 1e-9);
    assert!(c.pillars.event_delta >= -12.0 - 1e-9);
    assert!(c.pillars.macro_adj <= 8.0 + 1e-9);
    // Neutral macro with no observations.
    assert!((c.pillars.macro_adj - 4.0).abs() < 1e-9);
  }

  #[test]
  fn composition_is_deterministic() {
    let config = ScoringConfig::recommended("v1");
    let issuer = issuer();
    let (features, prices, evs) = (features(4.0), prices(), events(-0.4, 3));
    let inputs = ScoringInputs {
      issuer:             &issuer,
      features:           &features,
      prices:             &prices,
      events:             &evs,
      macro_observations: &[],
      cutoff:             t0(),
    };

    let a = compose(&config, &inputs).unwrap();
    let b = compose(&config, &inputs).unwrap();
    assert_eq!(a, b);
    assert_eq!(
      serde_json::to_vec(&a.explanation).unwrap(),
      serde_json::to_vec(&b.explanation).unwrap()
    );
  }

  #[test]
  fn missing_pillar_input_aborts_composition() {
    let config = ScoringConfig::recommended("v1");
    let issuer = issuer();
    let features = features(8.0);
    let err = compose(&config, &ScoringInputs {
      issuer:             &issuer,
      features:           &features,
      prices:             &[],
      events:             &[],
      macro_observations: &[],
      cutoff:             t0(),
    })
    .unwrap_err();
    assert!(matches!(err, Error::IncompleteFeatureSet { .. }));
  }

  #[test]
  fn negative_news_lowers_the_score() {
    let config = ScoringConfig::recommended("v1");
    let issuer = issuer();
    let (features, prices) = (features(8.0), prices());
    let bad = events(-1.0, 2);

    let score = |events: &[Event]| {
      compose(&config, &ScoringInputs {
        issuer: &issuer,
        features: &features,
        prices: &prices,
        events,
        macro_observations: &[],
        cutoff: t0(),
      })
      .unwrap()
      .score
    };

    assert!(score(&bad) < score(&[]));
  }
}
