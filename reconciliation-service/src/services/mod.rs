//! Services for the reconciliation engine.

pub mod database;
pub mod metrics;
pub mod reconciler;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics, record_error, record_reconcile_run, record_transaction_match};
pub use reconciler::{ReconcileOutcome, ReconcileRequest, Reconciler};
