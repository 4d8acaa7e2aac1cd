//! Handlers for score and event read endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/issuers/:id/score` | 404 if the issuer was never scored |
//! | `GET`  | `/issuers/:id/scores` | Newest first; `?limit=` (default 100) |
//! | `GET`  | `/issuers/:id/score-change` | `?hours_back=` (default 24) |
//! | `GET`  | `/issuers/:id/events/active` | `?hours_back=` (default 168) |
//! | `GET`  | `/scores/buckets` | Issuer count per bucket |

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use credo_core::{
  alert::ScoreChange,
  query::{self, ActiveEventView, DEFAULT_ACTIVE_EVENT_HOURS, DEFAULT_CHANGE_HOURS, ScoreView},
  score::Score,
  store::{CreditStore, StoreResultExt},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, require_positive_hours};

const DEFAULT_HISTORY_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 10_000;

fn never_scored(id: Uuid) -> ApiError {
  ApiError::NotFound(format!("issuer {id} has no scores"))
}

// ─── Latest ──────────────────────────────────────────────────────────────────

/// `GET /issuers/:id/score`
pub async fn latest<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ScoreView>, ApiError> {
  let view = query::latest_score(store.as_ref(), id)
    .await?
    .ok_or_else(|| never_scored(id))?;
  Ok(Json(view))
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /issuers/:id/scores[?limit=<n>]`
pub async fn history<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Score>>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
  if limit == 0 || limit > MAX_HISTORY_LIMIT {
    return Err(ApiError::BadRequest(format!(
      "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
    )));
  }
  if store.get_issuer(id).await.lift()?.is_none() {
    return Err(ApiError::NotFound(format!("issuer {id} not found")));
  }
  let scores = store.score_history(id, limit).await.lift()?;
  Ok(Json(scores))
}

// ─── Change ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HoursBackParams {
  pub hours_back: Option<i64>,
}

/// `GET /issuers/:id/score-change[?hours_back=<h>]`
pub async fn change<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HoursBackParams>,
) -> Result<Json<ScoreChange>, ApiError> {
  let hours = require_positive_hours(
    "hours_back",
    params.hours_back.unwrap_or(DEFAULT_CHANGE_HOURS),
  )?;
  let change = query::score_change(store.as_ref(), id, hours, Utc::now())
    .await?
    .ok_or_else(|| never_scored(id))?;
  Ok(Json(change))
}

// ─── Active events ───────────────────────────────────────────────────────────

/// `GET /issuers/:id/events/active[?hours_back=<h>]`
pub async fn active_events<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HoursBackParams>,
) -> Result<Json<Vec<ActiveEventView>>, ApiError> {
  let hours = require_positive_hours(
    "hours_back",
    params.hours_back.unwrap_or(DEFAULT_ACTIVE_EVENT_HOURS),
  )?;
  let events = query::active_events(store.as_ref(), id, hours, Utc::now()).await?;
  Ok(Json(events))
}

// ─── Buckets ─────────────────────────────────────────────────────────────────

/// `GET /scores/buckets`
pub async fn buckets<S: CreditStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<BTreeMap<String, usize>>, ApiError> {
  Ok(Json(query::bucket_distribution(store.as_ref()).await?))
}
