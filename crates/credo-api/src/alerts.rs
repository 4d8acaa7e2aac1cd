//! Handlers for `/alerts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/alerts/recent` | `?hours=` (default 24), optional `?issuer_id=` |
//! | `GET`  | `/alerts/subscriptions` | Optional `?issuer_id=`, `?active_only=` |
//! | `POST` | `/alerts/subscriptions` | Body: [`NewSubscription`]; threshold defaults to 5 |
//! | `POST` | `/alerts/subscriptions/:id/deactivate` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use credo_core::{
  alert::{AlertRecord, AlertSubscription, NewSubscription},
  query::{self, DEFAULT_ALERT_HOURS},
  store::{CreditStore, StoreResultExt},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, require_positive_hours};

// ─── Recent ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecentParams {
  pub hours:     Option<i64>,
  pub issuer_id: Option<Uuid>,
}

/// `GET /alerts/recent[?hours=<h>&issuer_id=<uuid>]`
pub async fn recent<S: CreditStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<RecentParams>,
) -> Result<Json<Vec<AlertRecord>>, ApiError> {
  let hours = require_positive_hours("hours", params.hours.unwrap_or(DEFAULT_ALERT_HOURS))?;
  let alerts =
    query::recent_alerts(store.as_ref(), hours, params.issuer_id, Utc::now()).await?;
  Ok(Json(alerts))
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
  pub issuer_id:   Option<Uuid>,
  #[serde(default)]
  pub active_only: bool,
}

/// `GET /alerts/subscriptions[?issuer_id=<uuid>&active_only=true]`
pub async fn list_subscriptions<S: CreditStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<SubscriptionParams>,
) -> Result<Json<Vec<AlertSubscription>>, ApiError> {
  let subs = store
    .list_subscriptions(params.issuer_id, params.active_only)
    .await
    .lift()?;
  Ok(Json(subs))
}

/// `POST /alerts/subscriptions`
pub async fn subscribe<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewSubscription>,
) -> Result<impl IntoResponse, ApiError> {
  let sub = store.add_subscription(body).await.lift()?;
  tracing::info!(
    subscription_id = %sub.subscription_id,
    issuer_id = %sub.issuer_id,
    threshold = sub.threshold,
    "subscription created"
  );
  Ok((StatusCode::CREATED, Json(sub)))
}

/// `POST /alerts/subscriptions/:id/deactivate`
pub async fn deactivate<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<AlertSubscription>, ApiError> {
  let sub = store.deactivate_subscription(id).await.lift()?;
  Ok(Json(sub))
}
