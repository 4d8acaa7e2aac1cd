use std::sync::Arc;

use axum::{
  body::{Body, to_bytes},
  http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use credo_core::{
  alert::AlertPolicy,
  cycle,
  model::NewModel,
  store::CreditStore,
};
use credo_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use crate::api_router;

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.unwrap())
}

async fn call(
  store: &Arc<SqliteStore>,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header("content-type", "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = api_router(store.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap();
  let status = resp.status();
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn create_issuer(store: &Arc<SqliteStore>, ticker: &str) -> Uuid {
  let (status, body) = call(
    store,
    "POST",
    "/issuers",
    Some(json!({ "name": format!("{ticker} Corp"), "ticker": ticker, "sector": "Industrials" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["issuer_id"].as_str().unwrap().parse().unwrap()
}

async fn register_baseline(store: &Arc<SqliteStore>, version: &str, activate: bool) -> Value {
  let mut body = serde_json::to_value(NewModel::baseline(version)).unwrap();
  body["activate"] = json!(activate);
  let (status, model) = call(store, "POST", "/models", Some(body)).await;
  assert_eq!(status, StatusCode::CREATED, "{model}");
  model
}

/// Push fundamentals and a month of flat prices through the ingest API.
async fn ingest_inputs(store: &Arc<SqliteStore>, issuer_id: Uuid) {
  let as_of = Utc::now() - Duration::days(20);
  let features: Vec<Value> = [("icr", 6.0), ("debt_to_ebitda", 2.0), ("current_ratio", 1.5)]
    .into_iter()
    .map(|(name, value)| {
      json!({ "issuer_id": issuer_id, "ts": as_of, "feature_name": name, "value": value, "source": "filing" })
    })
    .collect();
  let (status, stored) = call(store, "POST", "/ingest/features", Some(json!(features))).await;
  assert_eq!(status, StatusCode::CREATED, "{stored}");
  assert_eq!(stored.as_array().unwrap().len(), 3);

  let prices: Vec<Value> = (0..31)
    .map(|n| {
      json!({
        "issuer_id": issuer_id,
        "ts": Utc::now() - Duration::days(32 - n),
        "open": 50.0, "high": 50.5, "low": 49.5, "close": 50.0,
        "volume": 1_000_000.0, "adj_close": 50.0
      })
    })
    .collect();
  let (status, _) = call(store, "POST", "/ingest/prices", Some(json!(prices))).await;
  assert_eq!(status, StatusCode::CREATED);
}

async fn score_now(store: &Arc<SqliteStore>, issuer_id: Uuid) -> f64 {
  let model = store.current_model().await.unwrap().unwrap();
  let config = model.scoring_config().unwrap();
  let cutoff = Utc::now() - Duration::seconds(1);
  let report = cycle::run_cycle(store.as_ref(), &config, &AlertPolicy::default(), issuer_id, cutoff)
    .await
    .unwrap();
  report.score.score
}

// ─── Issuers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issuer_create_get_and_list() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;

  let (status, body) = call(&s, "GET", &format!("/issuers/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ticker"], "ACME");
  assert_eq!(body["country"], "US");

  let (_, listed) = call(&s, "GET", "/issuers?sector=Industrials", None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
  let (_, other) = call(&s, "GET", "/issuers?sector=Utilities", None).await;
  assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_ticker_is_conflict() {
  let s = store().await;
  create_issuer(&s, "ACME").await;
  let (status, body) =
    call(&s, "POST", "/issuers", Some(json!({ "name": "Other", "ticker": "ACME" }))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("ACME"));
}

#[tokio::test]
async fn unknown_issuer_is_404() {
  let s = store().await;
  let id = Uuid::new_v4();
  for path in [
    format!("/issuers/{id}"),
    format!("/issuers/{id}/score"),
    format!("/issuers/{id}/scores"),
    format!("/issuers/{id}/score-change"),
    format!("/issuers/{id}/events/active"),
  ] {
    let (status, _) = call(&s, "GET", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
  }
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_score_is_404_until_scored() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  register_baseline(&s, "v1", true).await;
  ingest_inputs(&s, id).await;

  let (status, _) = call(&s, "GET", &format!("/issuers/{id}/score"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let score = score_now(&s, id).await;

  let (status, view) = call(&s, "GET", &format!("/issuers/{id}/score"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!((view["score"].as_f64().unwrap() - score).abs() < 1e-9);
  assert_eq!(view["model_version"], "v1");
  let total: f64 = ["base", "market", "event_delta", "macro_adj"]
    .iter()
    .map(|k| view[*k].as_f64().unwrap())
    .sum();
  assert!((total.clamp(0.0, 100.0) - score).abs() <= 0.01);

  let (_, history) = call(&s, "GET", &format!("/issuers/{id}/scores?limit=5"), None).await;
  assert_eq!(history.as_array().unwrap().len(), 1);
  assert!(history[0]["explanation"]["summary"].is_string());

  let (_, buckets) = call(&s, "GET", "/scores/buckets", None).await;
  let bucket = view["bucket"].as_str().unwrap();
  assert_eq!(buckets[bucket], 1);
}

#[tokio::test]
async fn score_change_without_baseline_is_zero() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  register_baseline(&s, "v1", true).await;
  ingest_inputs(&s, id).await;
  let score = score_now(&s, id).await;

  let (status, change) =
    call(&s, "GET", &format!("/issuers/{id}/score-change?hours_back=24"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(change["score_change"], 0.0);
  assert!((change["previous_score"].as_f64().unwrap() - score).abs() < 1e-9);
  assert!(change["baseline_ts"].is_null());
}

#[tokio::test]
async fn non_positive_windows_are_rejected() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  let (status, _) =
    call(&s, "GET", &format!("/issuers/{id}/score-change?hours_back=0"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = call(&s, "GET", "/alerts/recent?hours=-3", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = call(&s, "GET", &format!("/issuers/{id}/scores?limit=0"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn active_events_hide_reingested_duplicates() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  let event = |hours_ago: i64| {
    json!({
      "issuer_id": id,
      "ts": Utc::now() - Duration::hours(hours_ago),
      "type": "earnings",
      "sentiment": 0.9,
      "weight": 8.0,
      "headline": "ACME beats estimates",
      "url": "https://wire.example/acme",
      "content_hash": null,
      "source": "newswire"
    })
  };
  let (status, first) = call(&s, "POST", "/ingest/events", Some(event(30))).await;
  assert_eq!(status, StatusCode::CREATED);
  call(&s, "POST", "/ingest/events", Some(event(2))).await;

  let (status, active) = call(&s, "GET", &format!("/issuers/{id}/events/active"), None).await;
  assert_eq!(status, StatusCode::OK);
  let active = active.as_array().unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0]["event_id"], first[0]["event_id"]);
  assert_eq!(active[0]["type"], "earnings");
  let factor = active[0]["decay_factor"].as_f64().unwrap();
  assert!(factor > 0.0 && factor < 1.0);
}

// ─── Models ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn model_registration_and_switching() {
  let s = store().await;
  let (status, _) = call(&s, "GET", "/models/current", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  register_baseline(&s, "v1", true).await;
  register_baseline(&s, "v2", false).await;
  let (_, current) = call(&s, "GET", "/models/current", None).await;
  assert_eq!(current["model_version"], "v1");

  let (status, _) = call(
    &s,
    "POST",
    "/models/current",
    Some(json!({ "model_version": "v2" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let (_, current) = call(&s, "GET", "/models/current", None).await;
  assert_eq!(current["model_version"], "v2");

  let mut dup = serde_json::to_value(NewModel::baseline("v1")).unwrap();
  dup["activate"] = json!(false);
  let (status, _) = call(&s, "POST", "/models", Some(dup)).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, _) = call(
    &s,
    "POST",
    "/models/current",
    Some(json!({ "model_version": "v9" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn model_without_half_life_is_bad_request() {
  let s = store().await;
  let mut body = serde_json::to_value(NewModel::baseline("broken")).unwrap();
  body["hyperparameters"]
    .as_object_mut()
    .unwrap()
    .remove("half_life_hours");
  let (status, err) = call(&s, "POST", "/models", Some(body)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST, "{err}");
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscription_lifecycle() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;

  let (status, sub) =
    call(&s, "POST", "/alerts/subscriptions", Some(json!({ "issuer_id": id }))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(sub["threshold"], 5.0);
  assert_eq!(sub["active"], true);
  let sub_id = sub["subscription_id"].as_str().unwrap();

  let (status, _) = call(
    &s,
    "POST",
    "/alerts/subscriptions",
    Some(json!({ "issuer_id": id, "threshold": -1.0 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, sub) = call(
    &s,
    "POST",
    &format!("/alerts/subscriptions/{sub_id}/deactivate"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(sub["active"], false);

  let (_, all) = call(&s, "GET", &format!("/alerts/subscriptions?issuer_id={id}"), None).await;
  assert_eq!(all.as_array().unwrap().len(), 1);
  let (_, active) = call(
    &s,
    "GET",
    &format!("/alerts/subscriptions?issuer_id={id}&active_only=true"),
    None,
  )
  .await;
  assert!(active.as_array().unwrap().is_empty());

  let missing = Uuid::new_v4();
  let (status, _) = call(
    &s,
    "POST",
    &format!("/alerts/subscriptions/{missing}/deactivate"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recent_alerts_is_empty_without_moves() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  register_baseline(&s, "v1", true).await;
  call(&s, "POST", "/alerts/subscriptions", Some(json!({ "issuer_id": id, "threshold": 0.5 }))).await;
  ingest_inputs(&s, id).await;
  score_now(&s, id).await;

  let (status, alerts) = call(&s, "GET", &format!("/alerts/recent?issuer_id={id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(alerts.as_array().unwrap().is_empty());
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_rejects_non_finite_and_unknown_issuers() {
  let s = store().await;
  let (status, _) = call(
    &s,
    "POST",
    "/ingest/features",
    Some(json!({
      "issuer_id": Uuid::new_v4(),
      "ts": Utc::now(),
      "feature_name": "icr",
      "value": 3.0,
      "source": null
    })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, stored) = call(
    &s,
    "POST",
    "/ingest/macro",
    Some(json!({ "ts": Utc::now(), "key": "vix", "value": 18.5, "source": "cboe" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(stored[0]["key"], "vix");
}

#[tokio::test]
async fn resent_price_batch_keeps_one_bar_per_day() {
  let s = store().await;
  let id = create_issuer(&s, "ACME").await;
  let end = Utc::now() - Duration::days(1);
  let batch: Vec<Value> = (0..5)
    .map(|n| {
      json!({
        "issuer_id": id,
        "ts": end - Duration::days(n),
        "open": 10.0, "high": 10.0, "low": 10.0, "close": 10.0,
        "volume": 100.0, "adj_close": 10.0
      })
    })
    .collect();

  let (status, first) = call(&s, "POST", "/ingest/prices", Some(json!(batch))).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, again) = call(&s, "POST", "/ingest/prices", Some(json!(batch))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(first[0]["price_id"], again[0]["price_id"]);

  let window = s.price_history(id, Utc::now(), 100).await.unwrap();
  assert_eq!(window.len(), 5);
}
