//! Event decay tracking.
//!
//! An event's remaining influence halves every `half_life_hours`:
//!
//! ```text
//! decay_factor(event, now) = exp(-ln 2 * elapsed_hours / half_life_hours)
//! ```
//!
//! The factor is 1.0 at ingestion and strictly decreasing afterwards; it is
//! recomputed from the event timestamp on every read and never stored. An
//! event whose factor has fallen to the significance floor drops out of the
//! active set but stays in storage.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  event::Event,
  model::{
    DEFAULT_EVENT_TYPE_WEIGHT, DEFAULT_HALF_LIFE_HOURS,
    DEFAULT_MAX_ACTIVE_EVENTS, DEFAULT_MAX_DAILY_EVENT_IMPACT,
    DEFAULT_SIGNIFICANCE_FLOOR, default_event_type_weights,
  },
};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Remaining-impact multiplier for an event at `event_ts`, observed at
/// `now`. Events stamped after `now` are treated as just ingested.
pub fn decay_factor(
  event_ts: DateTime<Utc>,
  now: DateTime<Utc>,
  half_life_hours: f64,
) -> f64 {
  let elapsed_hours =
    ((now - event_ts).num_milliseconds() as f64 / MILLIS_PER_HOUR).max(0.0);
  (-std::f64::consts::LN_2 * elapsed_hours / half_life_hours).exp()
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Validated decay and event-weighting parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayConfig {
  half_life_hours:        f64,
  significance_floor:     f64,
  type_weights:           BTreeMap<String, f64>,
  default_type_weight:    f64,
  max_daily_event_impact: f64,
  max_active_events:      usize,
}

impl DecayConfig {
  pub fn new(
    half_life_hours: f64,
    significance_floor: f64,
    type_weights: BTreeMap<String, f64>,
    default_type_weight: f64,
    max_daily_event_impact: f64,
    max_active_events: usize,
  ) -> Result<Self> {
    if !half_life_hours.is_finite() || half_life_hours <= 0.0 {
      return Err(Error::Configuration(format!(
        "half-life must be a positive number of hours, got {half_life_hours}"
      )));
    }
    if !(significance_floor > 0.0 && significance_floor < 1.0) {
      return Err(Error::Configuration(format!(
        "significance floor must lie in (0, 1), got {significance_floor}"
      )));
    }
    if let Some((ty, w)) = type_weights.iter().find(|(_, w)| !w.is_finite()) {
      return Err(Error::Configuration(format!(
        "type weight for {ty:?} is not finite: {w}"
      )));
    }
    if !default_type_weight.is_finite() {
      return Err(Error::Configuration(
        "default event type weight is not finite".into(),
      ));
    }
    if !max_daily_event_impact.is_finite() || max_daily_event_impact <= 0.0 {
      return Err(Error::Configuration(format!(
        "max daily event impact must be positive, got {max_daily_event_impact}"
      )));
    }
    if max_active_events == 0 {
      return Err(Error::Configuration(
        "max active events must be at least 1".into(),
      ));
    }
    Ok(Self {
      half_life_hours,
      significance_floor,
      type_weights,
      default_type_weight,
      max_daily_event_impact,
      max_active_events,
    })
  }

  pub fn recommended() -> Self {
    Self {
      half_life_hours:        DEFAULT_HALF_LIFE_HOURS,
      significance_floor:     DEFAULT_SIGNIFICANCE_FLOOR,
      type_weights:           default_event_type_weights(),
      default_type_weight:    DEFAULT_EVENT_TYPE_WEIGHT,
      max_daily_event_impact: DEFAULT_MAX_DAILY_EVENT_IMPACT,
      max_active_events:      DEFAULT_MAX_ACTIVE_EVENTS,
    }
  }

  pub fn half_life_hours(&self) -> f64 { self.half_life_hours }

  pub fn significance_floor(&self) -> f64 { self.significance_floor }

  pub fn max_daily_event_impact(&self) -> f64 { self.max_daily_event_impact }

  pub fn max_active_events(&self) -> usize { self.max_active_events }

  /// Configured weight for `event_type`, or the default for unknown types.
  pub fn type_weight(&self, event_type: &str) -> f64 {
    self
      .type_weights
      .get(event_type)
      .copied()
      .unwrap_or(self.default_type_weight)
  }

  pub fn decay_factor(&self, event_ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    decay_factor(event_ts, now, self.half_life_hours)
  }

  /// Strictly above the floor; an event sitting exactly on it is inactive.
  pub fn is_active(&self, decay_factor: f64) -> bool {
    decay_factor > self.significance_floor
  }

  /// The age at which an event's factor reaches the floor. Older events can
  /// be skipped by storage queries without changing the result.
  pub fn active_horizon(&self) -> Duration {
    let hours = self.half_life_hours * (1.0 / self.significance_floor).log2();
    // One extra hour so rounding never clips an event still above the floor.
    Duration::milliseconds((hours * MILLIS_PER_HOUR).ceil() as i64)
      + Duration::hours(1)
  }
}

// ─── Deduplication ───────────────────────────────────────────────────────────

/// Split `events` into first ingestions and re-ingestions of the same
/// content. The earliest timestamp for a content hash is authoritative; any
/// later row with the same hash is a duplicate. Output is ordered by
/// `(ts, event_id)`.
pub fn dedupe(events: &[Event]) -> (Vec<&Event>, Vec<&Event>) {
  let mut ordered: Vec<&Event> = events.iter().collect();
  ordered.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.event_id.cmp(&b.event_id)));

  let mut seen = HashSet::new();
  let mut kept = Vec::with_capacity(ordered.len());
  let mut duplicates = Vec::new();
  for event in ordered {
    if seen.insert(event.content_hash.as_str()) {
      kept.push(event);
    } else {
      let err = Error::DuplicateEventIngestion {
        content_hash: event.content_hash.clone(),
      };
      tracing::warn!(
        event_id = %event.event_id,
        issuer_id = %event.issuer_id,
        "{err}; excluded from event impact"
      );
      duplicates.push(event);
    }
  }
  (kept, duplicates)
}

// ─── Impact ──────────────────────────────────────────────────────────────────

/// An event that still carries weight at the evaluation instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEvent {
  pub event:        Event,
  pub decay_factor: f64,
  pub type_weight:  f64,
  /// `sentiment * type_weight * decay_factor`.
  pub contribution: f64,
}

/// The event pillar's raw material for one issuer at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventImpact {
  /// Active events considered, by descending contribution magnitude.
  pub active:      Vec<ActiveEvent>,
  /// Re-ingested content excluded from the sum.
  pub duplicates:  Vec<Uuid>,
  /// Active events dropped by the top-K bound.
  pub truncated:   usize,
  pub raw_sum:     f64,
  /// `raw_sum` clipped to `±max_daily_event_impact`.
  pub clipped_sum: f64,
}

/// Compute every event's current contribution and the bounded total.
///
/// Events stamped after `now` are not yet visible and are ignored. Only the
/// `max_active_events` largest contributions are summed, so the cost of a
/// cycle does not grow with event history.
pub fn assess(config: &DecayConfig, events: &[Event], now: DateTime<Utc>) -> EventImpact {
  let visible: Vec<Event> = events.iter().filter(|e| e.ts <= now).cloned().collect();
  let (kept, duplicates) = dedupe(&visible);

  let mut active: Vec<ActiveEvent> = kept
    .into_iter()
    .filter_map(|event| {
      let factor = config.decay_factor(event.ts, now);
      if !config.is_active(factor) {
        return None;
      }
      let type_weight = config.type_weight(&event.event_type);
      let sentiment = if event.sentiment.is_finite() {
        event.sentiment.clamp(-1.0, 1.0)
      } else {
        0.0
      };
      Some(ActiveEvent {
        event: event.clone(),
        decay_factor: factor,
        type_weight,
        contribution: sentiment * type_weight * factor,
      })
    })
    .collect();

  active.sort_by(|a, b| {
    b.contribution
      .abs()
      .total_cmp(&a.contribution.abs())
      .then(b.event.ts.cmp(&a.event.ts))
      .then(a.event.event_id.cmp(&b.event.event_id))
  });

  let truncated = active.len().saturating_sub(config.max_active_events);
  active.truncate(config.max_active_events);

  let raw_sum: f64 = active.iter().map(|a| a.contribution).sum();
  let bound = config.max_daily_event_impact;

  EventImpact {
    active,
    duplicates: duplicates.iter().map(|e| e.event_id).collect(),
    truncated,
    raw_sum,
    clipped_sum: raw_sum.clamp(-bound, bound),
  }
}
