//! Periodic scoring over every issuer.
//!
//! A run validates the current model once, then scores issuers concurrently.
//! Cycles for distinct issuers share nothing; cycles for the same issuer are
//! serialised through [`IssuerLocks`] so two overlapping runs never interleave
//! writes to one issuer's score history.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use credo_core::{
  Error, Result,
  alert::AlertPolicy,
  cycle,
  store::{CreditStore, StoreResultExt},
};
use serde::Serialize;
use tokio::{
  sync::{Mutex, Semaphore},
  task::JoinSet,
};
use uuid::Uuid;

// ─── IssuerLocks ─────────────────────────────────────────────────────────────

/// One async mutex per issuer, created on first use.
#[derive(Debug, Default)]
pub struct IssuerLocks {
  inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl IssuerLocks {
  pub fn new() -> Self { Self::default() }

  /// The lock guarding `issuer_id`'s score history.
  pub async fn lock_for(&self, issuer_id: Uuid) -> Arc<Mutex<()>> {
    self.inner.lock().await.entry(issuer_id).or_default().clone()
  }
}

// ─── RunReport ───────────────────────────────────────────────────────────────

/// Outcome of one scoring run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
  pub cutoff:        Option<DateTime<Utc>>,
  pub model_version: Option<String>,
  pub scored:        Vec<Uuid>,
  /// Issuers without the inputs a score needs, or already scored past the
  /// cutoff.
  pub skipped:       Vec<Uuid>,
  pub failed:        Vec<Uuid>,
  pub alerts_fired:  usize,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

pub struct Scheduler<S> {
  store:          Arc<S>,
  locks:          Arc<IssuerLocks>,
  policy:         AlertPolicy,
  max_concurrent: usize,
}

impl<S> Scheduler<S>
where
  S: CreditStore + 'static,
{
  pub fn new(store: Arc<S>, policy: AlertPolicy, max_concurrent: usize) -> Self {
    Self {
      store,
      locks: Arc::new(IssuerLocks::new()),
      policy,
      max_concurrent: max_concurrent.max(1),
    }
  }

  /// Score every issuer as of `cutoff`.
  ///
  /// A missing or invalid current model aborts the run before any issuer is
  /// touched. Any other failure is confined to its issuer and recorded in
  /// the report.
  pub async fn run_once(&self, cutoff: DateTime<Utc>) -> Result<RunReport> {
    let model = match self.store.current_model().await.lift()? {
      Some(model) => model,
      None => {
        tracing::error!(%cutoff, "scoring run aborted: no current model");
        return Err(Error::NoActiveModel);
      }
    };
    let config = match model.scoring_config() {
      Ok(config) => Arc::new(config),
      Err(e) => {
        tracing::error!(
          model_version = %model.model_version,
          error = %e,
          "scoring run aborted: invalid model configuration"
        );
        return Err(e);
      }
    };

    let issuers = self.store.list_issuers(None).await.lift()?;
    tracing::info!(
      %cutoff,
      model_version = %config.model_version,
      issuers = issuers.len(),
      "scoring run started"
    );

    let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
    let mut tasks = JoinSet::new();
    let mut task_issuers = HashMap::new();

    for issuer in issuers {
      let issuer_id = issuer.issuer_id;
      let store = self.store.clone();
      let locks = self.locks.clone();
      let config = config.clone();
      let semaphore = semaphore.clone();
      let policy = self.policy;

      let handle = tasks.spawn(async move {
        let _permit = semaphore.acquire_owned().await.map_err(Error::store)?;
        let lock = locks.lock_for(issuer_id).await;
        let _guard = lock.lock().await;
        cycle::run_cycle(store.as_ref(), &config, &policy, issuer_id, cutoff).await
      });
      task_issuers.insert(handle.id(), issuer_id);
    }

    let mut report = RunReport {
      cutoff: Some(cutoff),
      model_version: Some(config.model_version.clone()),
      ..RunReport::default()
    };

    while let Some(joined) = tasks.join_next_with_id().await {
      let (task_id, outcome) = match joined {
        Ok((task_id, outcome)) => (task_id, outcome),
        Err(e) => {
          tracing::error!(error = %e, "scoring task panicked");
          if let Some(issuer_id) = task_issuers.get(&e.id()) {
            report.failed.push(*issuer_id);
          }
          continue;
        }
      };
      let Some(&issuer_id) = task_issuers.get(&task_id) else {
        continue;
      };

      match outcome {
        Ok(cycle_report) => {
          report.alerts_fired += cycle_report.alerts.len();
          report.scored.push(issuer_id);
        }
        Err(e @ Error::IncompleteFeatureSet { .. }) => {
          tracing::warn!(%issuer_id, error = %e, "cycle skipped");
          report.skipped.push(issuer_id);
        }
        Err(e @ Error::StaleCutoff { .. }) => {
          tracing::warn!(%issuer_id, error = %e, "cycle skipped: cutoff precedes latest score");
          report.skipped.push(issuer_id);
        }
        Err(e) => {
          tracing::error!(%issuer_id, error = %e, "cycle failed");
          report.failed.push(issuer_id);
        }
      }
    }

    report.scored.sort();
    report.skipped.sort();
    report.failed.sort();

    tracing::info!(
      %cutoff,
      scored = report.scored.len(),
      skipped = report.skipped.len(),
      failed = report.failed.len(),
      alerts = report.alerts_fired,
      "scoring run finished"
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use credo_core::{
    alert::NewSubscription,
    issuer::NewIssuer,
    model::NewModel,
    observation::{NewFeatureSnapshot, NewPriceObservation},
  };
  use credo_store_sqlite::SqliteStore;

  use super::*;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

  async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.unwrap())
  }

  async fn issuer(s: &SqliteStore, ticker: &str) -> Uuid {
    s.add_issuer(NewIssuer::new(format!("{ticker} Corp")).with_ticker(ticker))
      .await
      .unwrap()
      .issuer_id
  }

  async fn seed(s: &SqliteStore, issuer_id: Uuid, icr: f64) {
    let as_of = t0() - Duration::days(10);
    for (name, value) in [("icr", icr), ("debt_to_ebitda", 2.0), ("current_ratio", 1.5)] {
      s.record_feature(NewFeatureSnapshot {
        issuer_id,
        ts: as_of,
        feature_name: name.into(),
        value,
        source: None,
      })
      .await
      .unwrap();
    }
    for n in 0..10 {
      s.record_price(NewPriceObservation {
        issuer_id,
        ts: t0() - Duration::days(10 - n),
        open: 20.0,
        high: 20.2,
        low: 19.8,
        close: 20.0,
        volume: 500_000.0,
        adj_close: 20.0,
      })
      .await
      .unwrap();
    }
  }

  #[tokio::test]
  async fn one_issuer_failing_does_not_stop_the_others() {
    let s = store().await;
    s.register_model(NewModel::baseline("v1"), true).await.unwrap();
    let ready = issuer(&s, "RDY").await;
    let bare = issuer(&s, "BARE").await;
    seed(&s, ready, 6.0).await;

    let scheduler = Scheduler::new(s.clone(), AlertPolicy::default(), 4);
    let report = scheduler.run_once(t0()).await.unwrap();

    assert_eq!(report.scored, vec![ready]);
    assert_eq!(report.skipped, vec![bare]);
    assert!(report.failed.is_empty());
    assert_eq!(report.model_version.as_deref(), Some("v1"));
    assert!(s.latest_score(ready).await.unwrap().is_some());
    assert!(s.latest_score(bare).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn missing_model_aborts_before_any_issuer() {
    let s = store().await;
    let id = issuer(&s, "ACME").await;
    seed(&s, id, 6.0).await;

    let scheduler = Scheduler::new(s.clone(), AlertPolicy::default(), 4);
    let err = scheduler.run_once(t0()).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(s.latest_score(id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn overlapping_runs_write_one_score_per_issuer() {
    let s = store().await;
    s.register_model(NewModel::baseline("v1"), true).await.unwrap();
    let mut ids = Vec::new();
    for ticker in ["AAA", "BBB", "CCC"] {
      let id = issuer(&s, ticker).await;
      seed(&s, id, 6.0).await;
      ids.push(id);
    }

    let scheduler = Arc::new(Scheduler::new(s.clone(), AlertPolicy::default(), 2));
    let (a, b) = tokio::join!(scheduler.run_once(t0()), scheduler.run_once(t0()));
    assert_eq!(a.unwrap().scored.len(), 3);
    assert_eq!(b.unwrap().scored.len(), 3);

    for id in ids {
      assert_eq!(s.score_history(id, 10).await.unwrap().len(), 1);
    }
  }

  #[tokio::test]
  async fn backfill_run_skips_issuers_scored_later() {
    let s = store().await;
    s.register_model(NewModel::baseline("v1"), true).await.unwrap();
    let id = issuer(&s, "ACME").await;
    seed(&s, id, 1.0).await;
    s.add_subscription(NewSubscription::new(id, 1.0)).await.unwrap();

    let scheduler = Scheduler::new(s.clone(), AlertPolicy::default(), 2);
    scheduler.run_once(t0() - Duration::hours(100)).await.unwrap();
    s.record_feature(NewFeatureSnapshot {
      issuer_id: id,
      ts: t0() - Duration::hours(80),
      feature_name: "icr".into(),
      value: 12.0,
      source: None,
    })
    .await
    .unwrap();
    let live = scheduler.run_once(t0()).await.unwrap();
    assert_eq!(live.alerts_fired, 1);

    let backfill = scheduler.run_once(t0() - Duration::hours(50)).await.unwrap();
    assert!(backfill.scored.is_empty());
    assert_eq!(backfill.skipped, vec![id]);
    assert!(backfill.failed.is_empty());
    assert_eq!(backfill.alerts_fired, 0);

    let history = s.score_history(id, 10).await.unwrap();
    assert_eq!(
      history.iter().map(|s| s.ts).collect::<Vec<_>>(),
      vec![t0(), t0() - Duration::hours(100)]
    );
    assert_eq!(s.recent_alerts(t0() - Duration::days(30), None).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn alerts_fire_across_runs() {
    let s = store().await;
    s.register_model(NewModel::baseline("v1"), true).await.unwrap();
    let id = issuer(&s, "ACME").await;
    seed(&s, id, 1.0).await;
    s.add_subscription(NewSubscription::new(id, 1.0)).await.unwrap();

    let scheduler = Scheduler::new(s.clone(), AlertPolicy::default(), 1);
    let first = scheduler.run_once(t0() - Duration::hours(30)).await.unwrap();
    assert_eq!(first.alerts_fired, 0);

    // Coverage jumps from 1x to 12x.
    s.record_feature(NewFeatureSnapshot {
      issuer_id: id,
      ts: t0() - Duration::hours(1),
      feature_name: "icr".into(),
      value: 12.0,
      source: None,
    })
    .await
    .unwrap();

    let second = scheduler.run_once(t0()).await.unwrap();
    assert_eq!(second.scored, vec![id]);
    assert_eq!(second.alerts_fired, 1);
  }
}
