//! Handlers for `/ingest` endpoints.
//!
//! Connectors push observations here. Each endpoint accepts either a single
//! object or an array of them, and answers `201` with the stored rows.
//! A batch is written row by row: a failing row stops the batch and rows
//! before it stay written. Re-sending a batch does not skew scoring. A price
//! bar is stored once per issuer and timestamp, and re-sent events share a
//! content hash and are excluded. Feature and macro reads take one latest
//! row per name.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/ingest/features` | [`NewFeatureSnapshot`] |
//! | `POST` | `/ingest/prices` | [`NewPriceObservation`] |
//! | `POST` | `/ingest/macro` | [`NewMacroObservation`] |
//! | `POST` | `/ingest/events` | [`NewEvent`]; `content_hash` is derived when absent |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use credo_core::{
  event::NewEvent,
  observation::{NewFeatureSnapshot, NewMacroObservation, NewPriceObservation},
  store::{CreditStore, StoreResultExt},
};
use serde::Deserialize;

use crate::error::ApiError;

/// A request body holding one item or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  Many(Vec<T>),
  One(T),
}

impl<T> OneOrMany<T> {
  fn into_vec(self) -> Vec<T> {
    match self {
      OneOrMany::Many(items) => items,
      OneOrMany::One(item) => vec![item],
    }
  }
}

// ─── Features ────────────────────────────────────────────────────────────────

/// `POST /ingest/features`
pub async fn features<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<OneOrMany<NewFeatureSnapshot>>,
) -> Result<impl IntoResponse, ApiError> {
  let mut stored = Vec::new();
  for item in body.into_vec() {
    stored.push(store.record_feature(item).await.lift()?);
  }
  tracing::debug!(count = stored.len(), "features ingested");
  Ok((StatusCode::CREATED, Json(stored)))
}

// ─── Prices ──────────────────────────────────────────────────────────────────

/// `POST /ingest/prices`
pub async fn prices<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<OneOrMany<NewPriceObservation>>,
) -> Result<impl IntoResponse, ApiError> {
  let mut stored = Vec::new();
  for item in body.into_vec() {
    stored.push(store.record_price(item).await.lift()?);
  }
  tracing::debug!(count = stored.len(), "prices ingested");
  Ok((StatusCode::CREATED, Json(stored)))
}

// ─── Macro ───────────────────────────────────────────────────────────────────

/// `POST /ingest/macro`
pub async fn macro_observations<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<OneOrMany<NewMacroObservation>>,
) -> Result<impl IntoResponse, ApiError> {
  let mut stored = Vec::new();
  for item in body.into_vec() {
    stored.push(store.record_macro(item).await.lift()?);
  }
  tracing::debug!(count = stored.len(), "macro observations ingested");
  Ok((StatusCode::CREATED, Json(stored)))
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// `POST /ingest/events`
pub async fn events<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<OneOrMany<NewEvent>>,
) -> Result<impl IntoResponse, ApiError> {
  let mut stored = Vec::new();
  for item in body.into_vec() {
    stored.push(store.record_event(item).await.lift()?);
  }
  tracing::debug!(count = stored.len(), "events ingested");
  Ok((StatusCode::CREATED, Json(stored)))
}
