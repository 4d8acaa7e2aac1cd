//! Handlers for `/issuers` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/issuers` | Optional `?sector=` |
//! | `POST` | `/issuers` | Body: [`NewIssuer`]; 409 if the ticker is taken |
//! | `GET`  | `/issuers/:id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use credo_core::{
  issuer::{Issuer, NewIssuer},
  store::{CreditStore, StoreResultExt},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub sector: Option<String>,
}

/// `GET /issuers[?sector=<sector>]`
pub async fn list<S: CreditStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Issuer>>, ApiError> {
  let issuers = store.list_issuers(params.sector).await.lift()?;
  Ok(Json(issuers))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /issuers`
pub async fn create<S: CreditStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewIssuer>,
) -> Result<impl IntoResponse, ApiError> {
  let issuer = store.add_issuer(body).await.lift()?;
  Ok((StatusCode::CREATED, Json(issuer)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /issuers/:id`
pub async fn get_one<S: CreditStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Issuer>, ApiError> {
  let issuer = store
    .get_issuer(id)
    .await
    .lift()?
    .ok_or_else(|| ApiError::NotFound(format!("issuer {id} not found")))?;
  Ok(Json(issuer))
}
