//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// The issuer lacks the inputs a score needs.
  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<credo_core::Error> for ApiError {
  fn from(e: credo_core::Error) -> Self {
    use credo_core::Error as E;
    match e {
      E::IssuerNotFound(_) | E::ModelNotFound(_) | E::SubscriptionNotFound(_) => {
        ApiError::NotFound(e.to_string())
      }
      E::InvalidInput(_) | E::Configuration(_) => ApiError::BadRequest(e.to_string()),
      E::DuplicateTicker(_)
      | E::ModelVersionExists(_)
      | E::DuplicateEventIngestion { .. }
      | E::StaleCutoff { .. }
      | E::NoActiveModel => ApiError::Conflict(e.to_string()),
      E::IncompleteFeatureSet { .. } => ApiError::Unprocessable(e.to_string()),
      E::Serialization(_) | E::Store(_) => ApiError::Store(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

/// Reject non-positive trailing windows.
pub(crate) fn require_positive_hours(name: &str, hours: i64) -> Result<i64, ApiError> {
  if hours > 0 {
    Ok(hours)
  } else {
    Err(ApiError::BadRequest(format!("{name} must be positive, got {hours}")))
  }
}
