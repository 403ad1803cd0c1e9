//! HTTP handlers for the reconciliation engine.

pub mod health;
pub mod reconcile;
