//! One issuer's scoring cycle against a [`CreditStore`].
//!
//! A cycle materialises the issuer's inputs as of a cutoff, composes the
//! score, records it, and only then evaluates alerts. Composition happens
//! before any write, so a failing pillar leaves the store untouched. Score
//! writes are idempotent on `(issuer_id, ts)` and alert writes are
//! conditional, so a cycle can be retried in full at the same cutoff. A
//! cutoff earlier than the issuer's latest score is refused with
//! [`Error::StaleCutoff`]; backfills never append behind newer history or
//! re-evaluate alerts.
//!
//! The cycle does not serialise concurrent runs for the same issuer; callers
//! that run cycles in parallel hold a per-issuer lock around it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  alert::{self, AlertHistory, AlertPolicy, ScoreChange},
  compose::{self, ScoringInputs},
  event::Event,
  issuer::Issuer,
  model::ScoringConfig,
  normalize::MARKET_WINDOW,
  observation::{FeatureSnapshot, MacroObservation, PriceObservation},
  score::Score,
  store::{CreditStore, StoreResultExt},
};

/// Owned inputs for one issuer at one cutoff, as read from the store.
#[derive(Debug, Clone)]
pub struct ScoringData {
  pub issuer:             Issuer,
  pub features:           Vec<FeatureSnapshot>,
  pub prices:             Vec<PriceObservation>,
  pub events:             Vec<Event>,
  pub macro_observations: Vec<MacroObservation>,
  pub cutoff:             DateTime<Utc>,
}

impl ScoringData {
  pub fn inputs(&self) -> ScoringInputs<'_> {
    ScoringInputs {
      issuer:             &self.issuer,
      features:           &self.features,
      prices:             &self.prices,
      events:             &self.events,
      macro_observations: &self.macro_observations,
      cutoff:             self.cutoff,
    }
  }
}

/// The outcome of a successful cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
  pub score:      Score,
  pub change:     ScoreChange,
  /// Alerts written by this cycle.
  pub alerts:     Vec<AlertHistory>,
  /// Qualifying alerts dropped by the dedupe window.
  pub suppressed: usize,
}

/// Read everything the composer needs for `issuer_id` as of `cutoff`.
///
/// Events older than the model's active horizon cannot clear the
/// significance floor and are not read.
pub async fn gather<S: CreditStore>(
  store: &S,
  config: &ScoringConfig,
  issuer_id: Uuid,
  cutoff: DateTime<Utc>,
) -> Result<ScoringData> {
  let issuer = store
    .get_issuer(issuer_id)
    .await
    .lift()?
    .ok_or(Error::IssuerNotFound(issuer_id))?;

  let features = store.latest_features(issuer_id, cutoff).await.lift()?;
  let prices = store
    .price_history(issuer_id, cutoff, MARKET_WINDOW)
    .await
    .lift()?;
  let since = cutoff - config.decay.active_horizon();
  let events = store.events_between(issuer_id, since, cutoff).await.lift()?;
  let macro_observations = store.latest_macro(cutoff).await.lift()?;

  Ok(ScoringData {
    issuer,
    features,
    prices,
    events,
    macro_observations,
    cutoff,
  })
}

/// Score `issuer_id` as of `cutoff` under `config`, record the score, and
/// write any alerts it qualifies for. Fails with [`Error::StaleCutoff`] when
/// the issuer already has a later score.
pub async fn run_cycle<S: CreditStore>(
  store: &S,
  config: &ScoringConfig,
  policy: &AlertPolicy,
  issuer_id: Uuid,
  cutoff: DateTime<Utc>,
) -> Result<CycleReport> {
  tracing::debug!(%issuer_id, %cutoff, model_version = %config.model_version, "scoring cycle started");

  if let Some(latest) = store.latest_score(issuer_id).await.lift()?
    && latest.ts > cutoff
  {
    return Err(Error::StaleCutoff {
      issuer_id,
      cutoff,
      latest: latest.ts,
    });
  }

  let data = gather(store, config, issuer_id, cutoff).await?;
  let new_score = compose::compose(config, &data.inputs())?;
  let score = store.record_score(new_score).await.lift()?;

  tracing::info!(
    %issuer_id,
    score = score.score,
    bucket = %score.bucket,
    model_version = %score.model_version,
    "score recorded"
  );

  let (change, alerts, suppressed) =
    evaluate_alerts(store, policy, &data.issuer, &score).await?;

  Ok(CycleReport {
    score,
    change,
    alerts,
    suppressed,
  })
}

/// Compare `score` with the baseline one lookback earlier and offer an
/// alert to every active subscription on the issuer.
pub async fn evaluate_alerts<S: CreditStore>(
  store: &S,
  policy: &AlertPolicy,
  issuer: &Issuer,
  score: &Score,
) -> Result<(ScoreChange, Vec<AlertHistory>, usize)> {
  let baseline = store
    .score_at_or_before(issuer.issuer_id, score.ts - policy.lookback)
    .await
    .lift()?;
  let change = ScoreChange::between(score, baseline.as_ref());

  let subscriptions = store
    .list_subscriptions(Some(issuer.issuer_id), true)
    .await
    .lift()?;

  let mut written = Vec::new();
  let mut suppressed = 0;
  for subscription in &subscriptions {
    let Some(candidate) = alert::evaluate(subscription, issuer, score, &change) else {
      continue;
    };
    match store
      .insert_alert_if_absent(candidate, policy.dedupe_window)
      .await
      .lift()?
    {
      Some(row) => {
        tracing::info!(
          alert_id = %row.alert_id,
          subscription_id = %row.subscription_id,
          score_change = row.score_change,
          "alert fired"
        );
        written.push(row);
      }
      None => {
        tracing::debug!(
          subscription_id = %subscription.subscription_id,
          "alert suppressed by dedupe window"
        );
        suppressed += 1;
      }
    }
  }

  Ok((change, written, suppressed))
}
