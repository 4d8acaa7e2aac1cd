//! Alert evaluation.
//!
//! The evaluator compares a freshly recorded score against a historical
//! baseline and decides, per subscription, whether the move is large enough
//! to alert on. It holds no state of its own: duplicate suppression is the
//! store's conditional insert (see
//! [`CreditStore::insert_alert_if_absent`](crate::store::CreditStore::insert_alert_if_absent)).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, issuer::Issuer, score::Score};

pub const DEFAULT_THRESHOLD: f64 = 5.0;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Moves this close to the threshold still count as reaching it.
const THRESHOLD_EPSILON: f64 = 1e-9;

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
  pub subscription_id: Uuid,
  pub issuer_id:       Uuid,
  /// Minimum absolute score move, in points, that triggers an alert.
  pub threshold:       f64,
  pub active:          bool,
  pub email:           Option<String>,
  pub webhook_url:     Option<String>,
  pub created_at:      DateTime<Utc>,
}

/// Input to [`crate::store::CreditStore::add_subscription`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
  pub issuer_id:   Uuid,
  #[serde(default = "default_threshold")]
  pub threshold:   f64,
  #[serde(default)]
  pub email:       Option<String>,
  #[serde(default)]
  pub webhook_url: Option<String>,
}

fn default_threshold() -> f64 { DEFAULT_THRESHOLD }

impl NewSubscription {
  pub fn new(issuer_id: Uuid, threshold: f64) -> Self {
    Self {
      issuer_id,
      threshold,
      email: None,
      webhook_url: None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !self.threshold.is_finite() || self.threshold < 0.0 {
      return Err(Error::InvalidInput(format!(
        "threshold must be a non-negative number, got {}",
        self.threshold
      )));
    }
    Ok(())
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
  ScoreIncrease,
  ScoreDecrease,
}

/// A recorded alert. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistory {
  pub alert_id:        Uuid,
  pub subscription_id: Uuid,
  pub issuer_id:       Uuid,
  pub alert_type:      AlertType,
  pub message:         String,
  pub score_change:    f64,
  /// The timestamp of the score that triggered the alert.
  pub triggered_at:    DateTime<Utc>,
}

/// Input to [`crate::store::CreditStore::insert_alert_if_absent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
  pub subscription_id: Uuid,
  pub issuer_id:       Uuid,
  pub alert_type:      AlertType,
  pub message:         String,
  pub score_change:    f64,
  pub triggered_at:    DateTime<Utc>,
}

/// An alert joined with the identity of its issuer and subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
  #[serde(flatten)]
  pub alert:       AlertHistory,
  pub issuer_name: String,
  pub ticker:      Option<String>,
  pub threshold:   f64,
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How far back the baseline is taken and how long a fired alert suppresses
/// the next one for the same subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
  pub lookback:      Duration,
  pub dedupe_window: Duration,
}

impl AlertPolicy {
  pub fn from_hours(lookback_hours: i64, dedupe_window_hours: i64) -> Result<Self> {
    if lookback_hours <= 0 || dedupe_window_hours <= 0 {
      return Err(Error::Configuration(format!(
        "alert windows must be positive (lookback {lookback_hours}h, dedupe \
         {dedupe_window_hours}h)"
      )));
    }
    Ok(Self {
      lookback:      Duration::hours(lookback_hours),
      dedupe_window: Duration::hours(dedupe_window_hours),
    })
  }
}

impl Default for AlertPolicy {
  fn default() -> Self {
    Self {
      lookback:      Duration::hours(DEFAULT_LOOKBACK_HOURS),
      dedupe_window: Duration::hours(DEFAULT_LOOKBACK_HOURS),
    }
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// A score move relative to a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
  pub score_change:   f64,
  pub current_score:  f64,
  pub previous_score: f64,
  /// Timestamp of the baseline row; `None` when no baseline existed.
  pub baseline_ts:    Option<DateTime<Utc>>,
}

impl ScoreChange {
  /// Change from `baseline` to `current`. With no usable baseline the
  /// previous score is taken to be the current one and the change is zero.
  pub fn between(current: &Score, baseline: Option<&Score>) -> Self {
    match baseline.filter(|b| b.ts < current.ts) {
      Some(b) => Self {
        score_change:   current.score - b.score,
        current_score:  current.score,
        previous_score: b.score,
        baseline_ts:    Some(b.ts),
      },
      None => Self {
        score_change:   0.0,
        current_score:  current.score,
        previous_score: current.score,
        baseline_ts:    None,
      },
    }
  }

  pub fn direction(&self) -> Option<AlertType> {
    if self.score_change > 0.0 {
      Some(AlertType::ScoreIncrease)
    } else if self.score_change < 0.0 {
      Some(AlertType::ScoreDecrease)
    } else {
      None
    }
  }
}

/// The alert `subscription` should receive for `current`, if any.
///
/// Returns `None` for inactive subscriptions, subscriptions on another
/// issuer, a zero change, or a move smaller than the threshold. Whether the
/// alert is actually written is decided by the store's dedupe window.
pub fn evaluate(
  subscription: &AlertSubscription,
  issuer: &Issuer,
  current: &Score,
  change: &ScoreChange,
) -> Option<NewAlert> {
  if !subscription.active || subscription.issuer_id != current.issuer_id {
    return None;
  }
  let alert_type = change.direction()?;
  let magnitude = change.score_change.abs();
  if magnitude + THRESHOLD_EPSILON < subscription.threshold {
    return None;
  }

  let verb = match alert_type {
    AlertType::ScoreIncrease => "rose",
    AlertType::ScoreDecrease => "fell",
  };
  let message = format!(
    "{label} credit score {verb} {magnitude:.1} points from {prev:.1} to \
     {curr:.1} ({bucket}), crossing the {threshold:.1}-point threshold.",
    label = issuer.display_label(),
    prev = change.previous_score,
    curr = change.current_score,
    bucket = current.bucket,
    threshold = subscription.threshold,
  );

  Some(NewAlert {
    subscription_id: subscription.subscription_id,
    issuer_id: current.issuer_id,
    alert_type,
    message,
    score_change: change.score_change,
    triggered_at: current.ts,
  })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    explain::{Driver, Explanation, SubscoreSummary},
    score::PillarBreakdown,
  };

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap() }

  fn issuer() -> Issuer {
    Issuer {
      issuer_id:  Uuid::from_u128(1),
      name:       "Initech Holdings".into(),
      ticker:     Some("INTC2".into()),
      cik:        None,
      sector:     Some("Technology".into()),
      country:    "US".into(),
      created_at: t0(),
    }
  }

  fn score(value: f64, ts: DateTime<Utc>) -> Score {
    let pillars = PillarBreakdown {
      base:        value,
      market:      0.0,
      event_delta: 0.0,
      macro_adj:   0.0,
    };
    Score {
      score_id: Uuid::new_v4(),
      issuer_id: Uuid::from_u128(1),
      ts,
      score: value,
      bucket: "AA".into(),
      pillars,
      model_version: "v1".into(),
      explanation: Explanation {
        model_version:       "v1".into(),
        pillars,
        subscores:           SubscoreSummary {
          base:              value,
          market:            50.0,
          macroeconomic:     50.0,
          event_sum:         0.0,
          event_sum_clipped: 0.0,
        },
        top_features:        vec![],
        events:              vec![],
        excluded_duplicates: 0,
        dominant:            Driver::Balanced,
        summary:             String::new(),
      },
    }
  }

  fn subscription(threshold: f64) -> AlertSubscription {
    AlertSubscription {
      subscription_id: Uuid::from_u128(9),
      issuer_id: Uuid::from_u128(1),
      threshold,
      active: true,
      email: Some("desk@example.com".into()),
      webhook_url: None,
      created_at: t0(),
    }
  }

  #[test]
  fn six_point_rise_crosses_five_point_threshold() {
    let baseline = score(82.1, t0() - Duration::hours(24));
    let current = score(88.1, t0());
    let change = ScoreChange::between(&current, Some(&baseline));
    assert!((change.score_change - 6.0).abs() < 1e-9);

    let alert = evaluate(&subscription(5.0), &issuer(), &current, &change).unwrap();
    assert_eq!(alert.alert_type, AlertType::ScoreIncrease);
    assert!((alert.score_change - 6.0).abs() < 1e-9);
    assert_eq!(alert.triggered_at, t0());
    assert_eq!(
      alert.message,
      "INTC2 credit score rose 6.0 points from 82.1 to 88.1 (AA), crossing the \
       5.0-point threshold."
    );
  }

  #[test]
  fn missing_baseline_means_no_change() {
    let current = score(70.0, t0());
    let change = ScoreChange::between(&current, None);
    assert_eq!(change.score_change, 0.0);
    assert_eq!(change.previous_score, change.current_score);
    assert!(change.baseline_ts.is_none());
    assert!(evaluate(&subscription(0.0), &issuer(), &current, &change).is_none());
  }

  #[test]
  fn baseline_not_before_current_is_ignored() {
    let current = score(70.0, t0());
    let later = score(40.0, t0() + Duration::hours(1));
    let change = ScoreChange::between(&current, Some(&later));
    assert_eq!(change.score_change, 0.0);
  }

  #[test]
  fn small_moves_and_inactive_subscriptions_do_not_alert() {
    let baseline = score(80.0, t0() - Duration::hours(30));
    let current = score(76.0, t0());
    let change = ScoreChange::between(&current, Some(&baseline));
    assert_eq!(change.direction(), Some(AlertType::ScoreDecrease));

    assert!(evaluate(&subscription(5.0), &issuer(), &current, &change).is_none());

    let alert = evaluate(&subscription(4.0), &issuer(), &current, &change).unwrap();
    assert_eq!(alert.alert_type, AlertType::ScoreDecrease);
    assert!(alert.message.contains("fell 4.0 points"));

    let mut inactive = subscription(1.0);
    inactive.active = false;
    assert!(evaluate(&inactive, &issuer(), &current, &change).is_none());
  }

  #[test]
  fn alert_type_round_trips_through_its_label() {
    assert_eq!(AlertType::ScoreDecrease.to_string(), "score_decrease");
    assert_eq!(
      "score_increase".parse::<AlertType>().unwrap(),
      AlertType::ScoreIncrease
    );
  }

  #[test]
  fn negative_thresholds_are_rejected() {
    assert!(NewSubscription::new(Uuid::nil(), -1.0).validate().is_err());
    assert!(NewSubscription::new(Uuid::nil(), f64::NAN).validate().is_err());
    assert!(NewSubscription::new(Uuid::nil(), 0.0).validate().is_ok());
  }

  #[test]
  fn policy_rejects_empty_windows() {
    assert!(AlertPolicy::from_hours(0, 24).is_err());
    assert_eq!(AlertPolicy::from_hours(24, 24).unwrap(), AlertPolicy::default());
  }
}
