//! Storage seams for the reconciliation engine.
//!
//! The orchestrator only ever talks to these traits, so the algorithm and the
//! run loop can be exercised against an in-memory store in tests and against
//! PostgreSQL in production.

pub mod memory;

use crate::models::{
    BankTransaction, CompanyExpense, MatchDecision, Receipt, ReconcileMode, RunRecord,
};
use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

pub use memory::InMemoryStore;

/// Result of one conditional match write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The transaction (and receipt, in receipt mode) was still unclaimed and
    /// has been updated.
    Applied,
    /// A concurrent run got there first; nothing was written. Treated as
    /// success-with-no-effect, not an error.
    StaleConflict,
}

/// Read side: candidate snapshots for one reconcile run.
///
/// Every fetch is scoped to a single company and returns only records that
/// are still eligible: unmatched negative-amount transactions, receipts with
/// no matched transaction, active expenses. Implementations must return rows
/// in a stable order (transactions by date then id) so repeated runs over
/// unchanged data reproduce identical pairings.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn unmatched_debit_transactions(
        &self,
        company_id: Uuid,
        statement_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError>;

    async fn unmatched_receipts(&self, company_id: Uuid) -> Result<Vec<Receipt>, AppError>;

    async fn active_expenses(&self, company_id: Uuid) -> Result<Vec<CompanyExpense>, AppError>;
}

/// Write side: translate one decision into record updates.
#[async_trait]
pub trait DecisionApplier: Send + Sync {
    /// Apply one decision: set the transaction's status, counterpart and note,
    /// and in receipt mode claim the receipt as well.
    ///
    /// The write must be conditional on the targets still being unclaimed so
    /// that a losing concurrent run (or a retry of an already-applied
    /// decision) is a no-op rather than an overwrite.
    async fn apply_match(
        &self,
        company_id: Uuid,
        decision: &MatchDecision,
        mode: ReconcileMode,
    ) -> Result<ApplyOutcome, AppError>;
}

/// Everything a running service needs from its store.
#[async_trait]
pub trait ReconciliationStore: CandidateRepository + DecisionApplier {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Persist the summary of a completed run. Best-effort from the caller's
    /// perspective: a failure here must not fail the run.
    async fn record_run(&self, record: &RunRecord) -> Result<(), AppError>;

    async fn list_runs(
        &self,
        company_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<RunRecord>, Option<Uuid>), AppError>;
}
