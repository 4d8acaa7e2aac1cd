//! Handlers for `/models` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/models` | Body: [`NewModel`] plus `activate` (default `true`); 409 if the version exists |
//! | `GET`  | `/models/current` | 404 before any model is registered |
//! | `POST` | `/models/current` | Body: `{"model_version":"v2"}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use credo_core::{
  model::{ModelMetadata, NewModel},
  store::{CreditStore, StoreResultExt},
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  #[serde(flatten)]
  pub model:    NewModel,
  #[serde(default = "default_activate")]
  pub activate: bool,
}

fn default_activate() -> bool { true }

/// `POST /models`
pub async fn register<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
  let model = store.register_model(body.model, body.activate).await.lift()?;
  Ok((StatusCode::CREATED, Json(model)))
}

// ─── Current ─────────────────────────────────────────────────────────────────

/// `GET /models/current`
pub async fn current<S: CreditStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<ModelMetadata>, ApiError> {
  let model = store
    .current_model()
    .await
    .lift()?
    .ok_or_else(|| ApiError::NotFound("no model registered".into()))?;
  Ok(Json(model))
}

#[derive(Debug, Deserialize)]
pub struct ActivateBody {
  pub model_version: String,
}

/// `POST /models/current`
pub async fn activate<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<ActivateBody>,
) -> Result<Json<ModelMetadata>, ApiError> {
  let model = store.activate_model(body.model_version).await.lift()?;
  Ok(Json(model))
}
