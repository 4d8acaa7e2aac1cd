//! JSON REST API for Credo.
//!
//! Exposes an axum [`Router`] backed by any [`credo_core::store::CreditStore`]:
//! the score and alert query surface, model registration, subscriptions, and
//! ingestion endpoints for external connectors. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", credo_api::api_router(store.clone()))
//! ```

pub mod alerts;
pub mod error;
pub mod ingest;
pub mod issuers;
pub mod models;
pub mod scores;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use credo_core::store::CreditStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: CreditStore + 'static,
{
  Router::new()
    // Issuers
    .route("/issuers", get(issuers::list::<S>).post(issuers::create::<S>))
    .route("/issuers/{id}", get(issuers::get_one::<S>))
    // Scores
    .route("/issuers/{id}/score", get(scores::latest::<S>))
    .route("/issuers/{id}/scores", get(scores::history::<S>))
    .route("/issuers/{id}/score-change", get(scores::change::<S>))
    .route("/issuers/{id}/events/active", get(scores::active_events::<S>))
    .route("/scores/buckets", get(scores::buckets::<S>))
    // Alerts
    .route("/alerts/recent", get(alerts::recent::<S>))
    .route(
      "/alerts/subscriptions",
      get(alerts::list_subscriptions::<S>).post(alerts::subscribe::<S>),
    )
    .route(
      "/alerts/subscriptions/{id}/deactivate",
      post(alerts::deactivate::<S>),
    )
    // Models
    .route("/models", post(models::register::<S>))
    .route(
      "/models/current",
      get(models::current::<S>).post(models::activate::<S>),
    )
    // Ingestion
    .route("/ingest/features", post(ingest::features::<S>))
    .route("/ingest/prices", post(ingest::prices::<S>))
    .route("/ingest/macro", post(ingest::macro_observations::<S>))
    .route("/ingest/events", post(ingest::events::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
