//! Core types, scoring engine, and trait definitions for Credo.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! engine stages (normalisation, event decay, composition, explanation,
//! alert evaluation) are pure functions of their inputs; storage is reached
//! only through the [`store::CreditStore`] trait.

pub mod alert;
pub mod bucket;
pub mod compose;
pub mod cycle;
pub mod decay;
pub mod error;
pub mod event;
pub mod explain;
pub mod issuer;
pub mod model;
pub mod normalize;
pub mod observation;
pub mod query;
pub mod score;
pub mod store;

pub use error::{Error, Result};
