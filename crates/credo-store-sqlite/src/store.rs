//! [`SqliteStore`]: the SQLite implementation of [`CreditStore`].

use std::path::Path;

use chrono::{DateTime, Duration, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use credo_core::{
  alert::{AlertHistory, AlertRecord, AlertSubscription, NewAlert, NewSubscription},
  event::{Event, NewEvent},
  issuer::{Issuer, NewIssuer},
  model::{ModelMetadata, NewModel},
  observation::{
    FeatureSnapshot, MacroObservation, NewFeatureSnapshot, NewMacroObservation,
    NewPriceObservation, PriceObservation,
  },
  score::{NewScore, Score},
  store::CreditStore,
};

use crate::{
  Error, Result,
  encode::{
    ALERT_COLUMNS, EVENT_COLUMNS, FEATURE_COLUMNS, ISSUER_COLUMNS, MACRO_COLUMNS,
    MODEL_COLUMNS, PRICE_COLUMNS, RawAlertRecord, RawEvent, RawFeature, RawIssuer,
    RawMacro, RawModel, RawPrice, RawScore, RawSubscription, SCORE_COLUMNS,
    SUBSCRIPTION_COLUMNS, content_hash, decode_dt, encode_alert_type, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// Timestamps are stored at microsecond precision; values handed back to
/// callers are truncated the same way so they compare equal to a re-read.
fn micros(ts: DateTime<Utc>) -> DateTime<Utc> { ts.trunc_subsecs(6) }

/// Outcome of a score write, decided inside one transaction.
enum Recorded {
  Inserted(RawScore),
  Existing(RawScore),
  /// A later score already exists; carries its encoded timestamp.
  Stale(String),
}

fn invalid(msg: impl Into<String>) -> Error {
  Error::Core(credo_core::Error::InvalidInput(msg.into()))
}

fn require_finite(label: &str, values: &[f64]) -> Result<()> {
  if values.iter().all(|v| v.is_finite()) {
    Ok(())
  } else {
    Err(invalid(format!("{label} values must be finite")))
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Credo store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn issuer_exists(&self, issuer_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(issuer_id);
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM issuers WHERE issuer_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn require_issuer(&self, issuer_id: Uuid) -> Result<()> {
    if self.issuer_exists(issuer_id).await? {
      Ok(())
    } else {
      Err(Error::Core(credo_core::Error::IssuerNotFound(issuer_id)))
    }
  }

  async fn get_subscription(&self, subscription_id: Uuid) -> Result<Option<AlertSubscription>> {
    let id_str = encode_uuid(subscription_id);
    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM alert_subscriptions
                 WHERE subscription_id = ?1"
              ),
              rusqlite::params![id_str],
              RawSubscription::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSubscription::into_subscription).transpose()
  }
}

// ─── CreditStore impl ────────────────────────────────────────────────────────

impl CreditStore for SqliteStore {
  type Error = Error;

  // ── Issuers ───────────────────────────────────────────────────────────────

  async fn add_issuer(&self, input: NewIssuer) -> Result<Issuer> {
    let name = input.name.trim().to_owned();
    if name.is_empty() {
      return Err(invalid("issuer name is blank"));
    }
    let ticker = input
      .ticker
      .map(|t| t.trim().to_owned())
      .filter(|t| !t.is_empty());

    let issuer = Issuer {
      issuer_id: Uuid::new_v4(),
      name,
      ticker,
      cik: input.cik,
      sector: input.sector,
      country: input.country,
      created_at: micros(Utc::now()),
    };

    let id_str = encode_uuid(issuer.issuer_id);
    let at_str = encode_dt(issuer.created_at);
    let row    = issuer.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(ticker) = &row.ticker {
          let taken = tx
            .query_row(
              "SELECT 1 FROM issuers WHERE ticker = ?1",
              rusqlite::params![ticker],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          if taken {
            return Ok(false);
          }
        }
        tx.execute(
          "INSERT INTO issuers (issuer_id, name, ticker, cik, sector, country, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, row.name, row.ticker, row.cik, row.sector, row.country, at_str,
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      let ticker = issuer.ticker.unwrap_or_default();
      return Err(Error::Core(credo_core::Error::DuplicateTicker(ticker)));
    }
    tracing::info!(issuer_id = %issuer.issuer_id, name = %issuer.name, "issuer registered");
    Ok(issuer)
  }

  async fn get_issuer(&self, id: Uuid) -> Result<Option<Issuer>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIssuer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ISSUER_COLUMNS} FROM issuers WHERE issuer_id = ?1"),
              rusqlite::params![id_str],
              RawIssuer::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIssuer::into_issuer).transpose()
  }

  async fn list_issuers(&self, sector: Option<String>) -> Result<Vec<Issuer>> {
    let raws: Vec<RawIssuer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ISSUER_COLUMNS} FROM issuers
           WHERE (?1 IS NULL OR sector = ?1)
           ORDER BY name, issuer_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![sector], RawIssuer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIssuer::into_issuer).collect()
  }

  // ── Observations, append-only ─────────────────────────────────────────────

  async fn record_feature(&self, input: NewFeatureSnapshot) -> Result<FeatureSnapshot> {
    require_finite("feature", &[input.value])?;
    if input.feature_name.trim().is_empty() {
      return Err(invalid("feature_name is blank"));
    }
    self.require_issuer(input.issuer_id).await?;

    let snapshot = FeatureSnapshot {
      snapshot_id:  Uuid::new_v4(),
      issuer_id:    input.issuer_id,
      ts:           micros(input.ts),
      feature_name: input.feature_name,
      value:        input.value,
      source:       input.source,
    };

    let id_str     = encode_uuid(snapshot.snapshot_id);
    let issuer_str = encode_uuid(snapshot.issuer_id);
    let ts_str     = encode_dt(snapshot.ts);
    let name       = snapshot.feature_name.clone();
    let value      = snapshot.value;
    let source     = snapshot.source.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO feature_snapshots (snapshot_id, issuer_id, ts, feature_name, value, source)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, issuer_str, ts_str, name, value, source],
        )?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn record_price(&self, input: NewPriceObservation) -> Result<PriceObservation> {
    require_finite("price", &[
      input.open,
      input.high,
      input.low,
      input.close,
      input.volume,
      input.adj_close,
    ])?;
    self.require_issuer(input.issuer_id).await?;

    let price = PriceObservation {
      price_id:  Uuid::new_v4(),
      issuer_id: input.issuer_id,
      ts:        micros(input.ts),
      open:      input.open,
      high:      input.high,
      low:       input.low,
      close:     input.close,
      volume:    input.volume,
      adj_close: input.adj_close,
    };

    let id_str     = encode_uuid(price.price_id);
    let issuer_str = encode_uuid(price.issuer_id);
    let ts_str     = encode_dt(price.ts);
    let p          = price;

    // One bar per issuer per timestamp; a re-sent bar returns the stored one.
    let (inserted, raw): (bool, RawPrice) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO prices
             (price_id, issuer_id, ts, open, high, low, close, volume, adj_close)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str, issuer_str, ts_str, p.open, p.high, p.low, p.close, p.volume,
            p.adj_close,
          ],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {PRICE_COLUMNS} FROM prices WHERE issuer_id = ?1 AND ts = ?2"),
          rusqlite::params![issuer_str, ts_str],
          RawPrice::from_row,
        )?;
        tx.commit()?;
        Ok((inserted == 1, raw))
      })
      .await?;

    let price = raw.into_price()?;
    if !inserted {
      tracing::debug!(
        issuer_id = %price.issuer_id,
        ts = %price.ts,
        "price bar already recorded"
      );
    }
    Ok(price)
  }

  async fn record_macro(&self, input: NewMacroObservation) -> Result<MacroObservation> {
    require_finite("macro", &[input.value])?;
    if input.key.trim().is_empty() {
      return Err(invalid("macro key is blank"));
    }

    let observation = MacroObservation {
      macro_id: Uuid::new_v4(),
      ts:       micros(input.ts),
      key:      input.key,
      value:    input.value,
      source:   input.source,
    };

    let id_str = encode_uuid(observation.macro_id);
    let ts_str = encode_dt(observation.ts);
    let key    = observation.key.clone();
    let value  = observation.value;
    let source = observation.source.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO macro_observations (macro_id, ts, key, value, source)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, ts_str, key, value, source],
        )?;
        Ok(())
      })
      .await?;

    Ok(observation)
  }

  async fn record_event(&self, input: NewEvent) -> Result<Event> {
    require_finite("event weight", &[input.weight])?;
    if input.event_type.trim().is_empty() {
      return Err(invalid("event type is blank"));
    }
    self.require_issuer(input.issuer_id).await?;

    let sentiment = input.clamped_sentiment();
    let hash = match input.content_hash.filter(|h| !h.trim().is_empty()) {
      Some(h) => h,
      None => content_hash(&input.headline, input.url.as_deref()),
    };

    let event = Event {
      event_id: Uuid::new_v4(),
      issuer_id: input.issuer_id,
      ts: micros(input.ts),
      event_type: input.event_type,
      sentiment,
      weight: input.weight,
      headline: input.headline,
      url: input.url,
      content_hash: hash,
      source: input.source,
    };

    let id_str     = encode_uuid(event.event_id);
    let issuer_str = encode_uuid(event.issuer_id);
    let ts_str     = encode_dt(event.ts);
    let e          = event.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             event_id, issuer_id, ts, event_type, sentiment, weight,
             headline, url, content_hash, source
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            issuer_str,
            ts_str,
            e.event_type,
            e.sentiment,
            e.weight,
            e.headline,
            e.url,
            e.content_hash,
            e.source,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  // ── Observation reads ─────────────────────────────────────────────────────

  async fn latest_features(
    &self,
    issuer_id: Uuid,
    cutoff:    DateTime<Utc>,
  ) -> Result<Vec<FeatureSnapshot>> {
    let issuer_str = encode_uuid(issuer_id);
    let cutoff_str = encode_dt(cutoff);

    let raws: Vec<RawFeature> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FEATURE_COLUMNS} FROM (
             SELECT *, ROW_NUMBER() OVER (
               PARTITION BY feature_name ORDER BY ts DESC, rowid DESC
             ) AS rn
             FROM feature_snapshots
             WHERE issuer_id = ?1 AND ts <= ?2
           )
           WHERE rn = 1
           ORDER BY feature_name"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![issuer_str, cutoff_str], RawFeature::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFeature::into_feature).collect()
  }

  async fn price_history(
    &self,
    issuer_id: Uuid,
    cutoff:    DateTime<Utc>,
    limit:     usize,
  ) -> Result<Vec<PriceObservation>> {
    let issuer_str = encode_uuid(issuer_id);
    let cutoff_str = encode_dt(cutoff);
    let limit      = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawPrice> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PRICE_COLUMNS} FROM prices
           WHERE issuer_id = ?1 AND ts <= ?2
           ORDER BY ts DESC, rowid DESC
           LIMIT ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![issuer_str, cutoff_str, limit],
            RawPrice::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut prices = raws
      .into_iter()
      .map(RawPrice::into_price)
      .collect::<Result<Vec<_>>>()?;
    prices.reverse();
    Ok(prices)
  }

  async fn latest_macro(&self, cutoff: DateTime<Utc>) -> Result<Vec<MacroObservation>> {
    let cutoff_str = encode_dt(cutoff);

    let raws: Vec<RawMacro> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MACRO_COLUMNS} FROM (
             SELECT *, ROW_NUMBER() OVER (
               PARTITION BY key ORDER BY ts DESC, rowid DESC
             ) AS rn
             FROM macro_observations
             WHERE ts <= ?1
           )
           WHERE rn = 1
           ORDER BY key"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff_str], RawMacro::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMacro::into_macro).collect()
  }

  async fn events_between(
    &self,
    issuer_id: Uuid,
    since:     DateTime<Utc>,
    until:     DateTime<Utc>,
  ) -> Result<Vec<Event>> {
    let issuer_str = encode_uuid(issuer_id);
    let since_str  = encode_dt(since);
    let until_str  = encode_dt(until);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE issuer_id = ?1
             AND ts <= ?3
             AND (
               ts >= ?2
               OR content_hash IN (
                 SELECT content_hash FROM events
                 WHERE issuer_id = ?1 AND ts >= ?2 AND ts <= ?3
               )
             )
           ORDER BY ts, event_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![issuer_str, since_str, until_str],
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn record_score(&self, input: NewScore) -> Result<Score> {
    let explanation_json = serde_json::to_string(&input.explanation)?;
    let score_id_str     = encode_uuid(Uuid::new_v4());
    let issuer_str       = encode_uuid(input.issuer_id);
    let ts_str           = encode_dt(input.ts);
    let issuer_id        = input.issuer_id;
    let ts               = micros(input.ts);
    let s                = input;

    let recorded: Recorded = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
          .query_row(
            &format!("SELECT {SCORE_COLUMNS} FROM scores WHERE issuer_id = ?1 AND ts = ?2"),
            rusqlite::params![issuer_str, ts_str],
            RawScore::from_row,
          )
          .optional()?;
        if let Some(raw) = existing {
          return Ok(Recorded::Existing(raw));
        }

        // History only grows forward in time.
        let latest: Option<String> = tx.query_row(
          "SELECT MAX(ts) FROM scores WHERE issuer_id = ?1",
          rusqlite::params![issuer_str],
          |row| row.get(0),
        )?;
        if let Some(latest) = latest.filter(|latest| *latest > ts_str) {
          return Ok(Recorded::Stale(latest));
        }

        tx.execute(
          "INSERT INTO scores (
             score_id, issuer_id, ts, score, bucket,
             base, market, event_delta, macro_adj,
             model_version, explanation_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          rusqlite::params![
            score_id_str,
            issuer_str,
            ts_str,
            s.score,
            s.bucket,
            s.pillars.base,
            s.pillars.market,
            s.pillars.event_delta,
            s.pillars.macro_adj,
            s.model_version,
            explanation_json,
          ],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {SCORE_COLUMNS} FROM scores WHERE issuer_id = ?1 AND ts = ?2"),
          rusqlite::params![issuer_str, ts_str],
          RawScore::from_row,
        )?;
        tx.commit()?;
        Ok(Recorded::Inserted(raw))
      })
      .await?;

    match recorded {
      Recorded::Inserted(raw) => raw.into_score(),
      Recorded::Existing(raw) => {
        let score = raw.into_score()?;
        tracing::debug!(
          issuer_id = %score.issuer_id,
          ts = %score.ts,
          "score already recorded for this cutoff"
        );
        Ok(score)
      }
      Recorded::Stale(latest) => Err(Error::Core(credo_core::Error::StaleCutoff {
        issuer_id,
        cutoff: ts,
        latest: decode_dt(&latest)?,
      })),
    }
  }

  async fn latest_score(&self, issuer_id: Uuid) -> Result<Option<Score>> {
    let issuer_str = encode_uuid(issuer_id);

    let raw: Option<RawScore> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SCORE_COLUMNS} FROM scores
                 WHERE issuer_id = ?1
                 ORDER BY ts DESC
                 LIMIT 1"
              ),
              rusqlite::params![issuer_str],
              RawScore::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScore::into_score).transpose()
  }

  async fn score_at_or_before(
    &self,
    issuer_id: Uuid,
    at:        DateTime<Utc>,
  ) -> Result<Option<Score>> {
    let issuer_str = encode_uuid(issuer_id);
    let at_str     = encode_dt(at);

    let raw: Option<RawScore> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SCORE_COLUMNS} FROM scores
                 WHERE issuer_id = ?1 AND ts <= ?2
                 ORDER BY ts DESC
                 LIMIT 1"
              ),
              rusqlite::params![issuer_str, at_str],
              RawScore::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScore::into_score).transpose()
  }

  async fn score_history(&self, issuer_id: Uuid, limit: usize) -> Result<Vec<Score>> {
    let issuer_str = encode_uuid(issuer_id);
    let limit      = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCORE_COLUMNS} FROM scores
           WHERE issuer_id = ?1
           ORDER BY ts DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![issuer_str, limit], RawScore::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScore::into_score).collect()
  }

  async fn latest_scores(&self) -> Result<Vec<Score>> {
    let raws: Vec<RawScore> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCORE_COLUMNS} FROM (
             SELECT *, ROW_NUMBER() OVER (
               PARTITION BY issuer_id ORDER BY ts DESC
             ) AS rn
             FROM scores
           )
           WHERE rn = 1
           ORDER BY issuer_id"
        ))?;
        let rows = stmt
          .query_map([], RawScore::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScore::into_score).collect()
  }

  // ── Models ────────────────────────────────────────────────────────────────

  async fn register_model(&self, input: NewModel, activate: bool) -> Result<ModelMetadata> {
    input.validate()?;

    let model = ModelMetadata {
      model_version:      input.model_version,
      model_type:         input.model_type,
      hyperparameters:    input.hyperparameters,
      feature_importance: input.feature_importance,
      registered_at:      micros(Utc::now()),
    };

    let version     = model.model_version.clone();
    let model_type  = model.model_type.clone();
    let hyper_json  = serde_json::to_string(&model.hyperparameters)?;
    let import_json = serde_json::to_string(&model.feature_importance)?;
    let at_str      = encode_dt(model.registered_at);

    let outcome: Option<bool> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM models WHERE model_version = ?1",
            rusqlite::params![version],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO models (
             model_version, model_type, hyperparameters_json,
             feature_importance_json, registered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![version, model_type, hyper_json, import_json, at_str],
        )?;

        let has_current = tx
          .query_row("SELECT 1 FROM current_model WHERE id = 1", [], |_| Ok(true))
          .optional()?
          .unwrap_or(false);
        let make_current = activate || !has_current;
        if make_current {
          tx.execute(
            "INSERT INTO current_model (id, model_version, activated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE
               SET model_version = excluded.model_version,
                   activated_at  = excluded.activated_at",
            rusqlite::params![version, at_str],
          )?;
        }
        tx.commit()?;
        Ok(Some(make_current))
      })
      .await?;

    match outcome {
      None => Err(Error::Core(credo_core::Error::ModelVersionExists(
        model.model_version,
      ))),
      Some(current) => {
        tracing::info!(
          model_version = %model.model_version,
          current,
          "model registered"
        );
        Ok(model)
      }
    }
  }

  async fn get_model(&self, model_version: String) -> Result<Option<ModelMetadata>> {
    let raw: Option<RawModel> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {MODEL_COLUMNS} FROM models WHERE model_version = ?1"),
              rusqlite::params![model_version],
              RawModel::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawModel::into_model).transpose()
  }

  async fn current_model(&self) -> Result<Option<ModelMetadata>> {
    let raw: Option<RawModel> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {MODEL_COLUMNS} FROM models
                 WHERE model_version = (
                   SELECT model_version FROM current_model WHERE id = 1
                 )"
              ),
              [],
              RawModel::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawModel::into_model).transpose()
  }

  async fn activate_model(&self, model_version: String) -> Result<ModelMetadata> {
    let Some(model) = self.get_model(model_version.clone()).await? else {
      return Err(Error::Core(credo_core::Error::ModelNotFound(model_version)));
    };
    // A stored model that no longer validates must not become current.
    model.scoring_config()?;

    let version = model.model_version.clone();
    let at_str  = encode_dt(micros(Utc::now()));
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO current_model (id, model_version, activated_at)
           VALUES (1, ?1, ?2)
           ON CONFLICT (id) DO UPDATE
             SET model_version = excluded.model_version,
                 activated_at  = excluded.activated_at",
          rusqlite::params![version, at_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(model_version = %model.model_version, "model activated");
    Ok(model)
  }

  // ── Alerts ────────────────────────────────────────────────────────────────

  async fn add_subscription(&self, input: NewSubscription) -> Result<AlertSubscription> {
    input.validate()?;
    self.require_issuer(input.issuer_id).await?;

    let subscription = AlertSubscription {
      subscription_id: Uuid::new_v4(),
      issuer_id:       input.issuer_id,
      threshold:       input.threshold,
      active:          true,
      email:           input.email,
      webhook_url:     input.webhook_url,
      created_at:      micros(Utc::now()),
    };

    let id_str     = encode_uuid(subscription.subscription_id);
    let issuer_str = encode_uuid(subscription.issuer_id);
    let at_str     = encode_dt(subscription.created_at);
    let sub        = subscription.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO alert_subscriptions (
             subscription_id, issuer_id, threshold, active, email, webhook_url, created_at
           ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            issuer_str,
            sub.threshold,
            sub.email,
            sub.webhook_url,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(subscription)
  }

  async fn list_subscriptions(
    &self,
    issuer_id:   Option<Uuid>,
    active_only: bool,
  ) -> Result<Vec<AlertSubscription>> {
    let issuer_str = issuer_id.map(encode_uuid);

    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM alert_subscriptions
           WHERE (?1 IS NULL OR issuer_id = ?1)
             AND (?2 = 0 OR active = 1)
           ORDER BY created_at, subscription_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![issuer_str, active_only],
            RawSubscription::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawSubscription::into_subscription)
      .collect()
  }

  async fn deactivate_subscription(&self, subscription_id: Uuid) -> Result<AlertSubscription> {
    let id_str = encode_uuid(subscription_id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE alert_subscriptions SET active = 0 WHERE subscription_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::Core(credo_core::Error::SubscriptionNotFound(
        subscription_id,
      )));
    }
    self
      .get_subscription(subscription_id)
      .await?
      .ok_or(Error::Core(credo_core::Error::SubscriptionNotFound(
        subscription_id,
      )))
  }

  async fn insert_alert_if_absent(
    &self,
    alert:  NewAlert,
    window: Duration,
  ) -> Result<Option<AlertHistory>> {
    let row = AlertHistory {
      alert_id:        Uuid::new_v4(),
      subscription_id: alert.subscription_id,
      issuer_id:       alert.issuer_id,
      alert_type:      alert.alert_type,
      message:         alert.message,
      score_change:    alert.score_change,
      triggered_at:    micros(alert.triggered_at),
    };

    let id_str     = encode_uuid(row.alert_id);
    let sub_str    = encode_uuid(row.subscription_id);
    let issuer_str = encode_uuid(row.issuer_id);
    let type_str   = encode_alert_type(row.alert_type);
    let at_str     = encode_dt(row.triggered_at);
    let lower_str  = encode_dt(row.triggered_at - window);
    let upper_str  = encode_dt(row.triggered_at + window);
    let message    = row.message.clone();
    let change     = row.score_change;

    // The check and the insert share one IMMEDIATE transaction, so a
    // concurrent retry for the same subscription cannot slip in between.
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
          .query_row(
            "SELECT 1 FROM alert_history
             WHERE subscription_id = ?1
               AND triggered_at > ?2
               AND triggered_at < ?3
             LIMIT 1",
            rusqlite::params![sub_str, lower_str, upper_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if existing {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO alert_history (
             alert_id, subscription_id, issuer_id, alert_type,
             message, score_change, triggered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, sub_str, issuer_str, type_str, message, change, at_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(inserted.then_some(row))
  }

  async fn recent_alerts(
    &self,
    since:     DateTime<Utc>,
    issuer_id: Option<Uuid>,
  ) -> Result<Vec<AlertRecord>> {
    let since_str  = encode_dt(since);
    let issuer_str = issuer_id.map(encode_uuid);

    let raws: Vec<RawAlertRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ALERT_COLUMNS}, i.name, i.ticker, s.threshold
           FROM alert_history a
           JOIN issuers i             ON i.issuer_id       = a.issuer_id
           JOIN alert_subscriptions s ON s.subscription_id = a.subscription_id
           WHERE a.triggered_at >= ?1
             AND (?2 IS NULL OR a.issuer_id = ?2)
           ORDER BY a.triggered_at DESC, a.rowid DESC"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![since_str, issuer_str],
            RawAlertRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlertRecord::into_record).collect()
  }
}
