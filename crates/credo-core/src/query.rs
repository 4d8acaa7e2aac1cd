//! Read-side queries for the dashboard and API.
//!
//! Every query is a derived read over append-only rows. Nothing here writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  alert::{AlertRecord, ScoreChange},
  decay::{self, DecayConfig},
  issuer::Issuer,
  score::Score,
  store::{CreditStore, StoreResultExt},
};

pub const DEFAULT_CHANGE_HOURS: i64 = 24;
pub const DEFAULT_ACTIVE_EVENT_HOURS: i64 = 168;
pub const DEFAULT_ALERT_HOURS: i64 = 24;

/// The headline view of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreView {
  pub score:         f64,
  pub bucket:        String,
  pub ts:            DateTime<Utc>,
  pub base:          f64,
  pub market:        f64,
  pub event_delta:   f64,
  pub macro_adj:     f64,
  pub model_version: String,
}

impl From<&Score> for ScoreView {
  fn from(s: &Score) -> Self {
    Self {
      score:         s.score,
      bucket:        s.bucket.clone(),
      ts:            s.ts,
      base:          s.pillars.base,
      market:        s.pillars.market,
      event_delta:   s.pillars.event_delta,
      macro_adj:     s.pillars.macro_adj,
      model_version: s.model_version.clone(),
    }
  }
}

/// An active event with its decay factor as of the query instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEventView {
  pub event_id:     Uuid,
  #[serde(rename = "type")]
  pub event_type:   String,
  pub headline:     String,
  pub sentiment:    f64,
  pub weight:       f64,
  pub decay_factor: f64,
  pub ts:           DateTime<Utc>,
}

async fn require_issuer<S: CreditStore>(store: &S, issuer_id: Uuid) -> Result<Issuer> {
  store
    .get_issuer(issuer_id)
    .await
    .lift()?
    .ok_or(Error::IssuerNotFound(issuer_id))
}

/// The issuer's most recent score, or `None` if it has never been scored.
pub async fn latest_score<S: CreditStore>(
  store: &S,
  issuer_id: Uuid,
) -> Result<Option<ScoreView>> {
  require_issuer(store, issuer_id).await?;
  let latest = store.latest_score(issuer_id).await.lift()?;
  Ok(latest.as_ref().map(ScoreView::from))
}

/// Change between the latest score and the last score at or before
/// `now - hours_back`. Without such a baseline the change is zero and the
/// previous score equals the current one. `None` if never scored.
pub async fn score_change<S: CreditStore>(
  store: &S,
  issuer_id: Uuid,
  hours_back: i64,
  now: DateTime<Utc>,
) -> Result<Option<ScoreChange>> {
  require_issuer(store, issuer_id).await?;
  let Some(current) = store.latest_score(issuer_id).await.lift()? else {
    return Ok(None);
  };
  let boundary = now - Duration::hours(hours_back);
  let baseline = store.score_at_or_before(issuer_id, boundary).await.lift()?;
  Ok(Some(ScoreChange::between(&current, baseline.as_ref())))
}

/// Events ingested in the last `hours_back` hours whose decay factor is
/// still above the significance floor, newest first. Decay parameters come
/// from the current model, or the standard defaults before one exists.
/// Re-ingested duplicates are not listed.
pub async fn active_events<S: CreditStore>(
  store: &S,
  issuer_id: Uuid,
  hours_back: i64,
  now: DateTime<Utc>,
) -> Result<Vec<ActiveEventView>> {
  require_issuer(store, issuer_id).await?;
  let config = match store.current_model().await.lift()? {
    Some(model) => model.scoring_config()?.decay,
    None => DecayConfig::recommended(),
  };

  let since = now - Duration::hours(hours_back);
  let events = store.events_between(issuer_id, since, now).await.lift()?;
  let (kept, _) = decay::dedupe(&events);

  let mut views: Vec<ActiveEventView> = kept
    .into_iter()
    .filter(|e| e.ts >= since)
    .filter_map(|e| {
      let factor = config.decay_factor(e.ts, now);
      config.is_active(factor).then(|| ActiveEventView {
        event_id:     e.event_id,
        event_type:   e.event_type.clone(),
        headline:     e.headline.clone(),
        sentiment:    e.sentiment,
        weight:       e.weight,
        decay_factor: factor,
        ts:           e.ts,
      })
    })
    .collect();
  views.sort_by(|a, b| b.ts.cmp(&a.ts).then(a.event_id.cmp(&b.event_id)));
  Ok(views)
}

/// Alerts triggered in the trailing `hours` window, optionally for one
/// issuer.
pub async fn recent_alerts<S: CreditStore>(
  store: &S,
  hours: i64,
  issuer_id: Option<Uuid>,
  now: DateTime<Utc>,
) -> Result<Vec<AlertRecord>> {
  store
    .recent_alerts(now - Duration::hours(hours), issuer_id)
    .await
    .lift()
}

/// Number of issuers per bucket, by each issuer's latest score.
pub async fn bucket_distribution<S: CreditStore>(
  store: &S,
) -> Result<BTreeMap<String, usize>> {
  let latest = store.latest_scores().await.lift()?;
  let mut counts = BTreeMap::new();
  for score in latest {
    *counts.entry(score.bucket).or_insert(0) += 1;
  }
  Ok(counts)
}
