//! The reconcile run orchestrator.
//!
//! Fetches the two candidate snapshots, runs the matching algorithm, applies
//! each decision through the store, and reports counts. Stateless across
//! invocations: matched records drop out of the next run's candidate fetch,
//! so re-running over unchanged data produces zero new matches.

use crate::matching::match_candidates;
use crate::models::{
    ApplyFailure, MatchCandidate, MatchConfidence, MatchDecision, ReconcileMode, ReconcileSummary,
    RunRecord,
};
use crate::repository::{
    ApplyOutcome, CandidateRepository, DecisionApplier, ReconciliationStore,
};
use crate::services::metrics::{record_error, record_reconcile_run, record_transaction_match};
use chrono::Utc;
use futures::StreamExt;
use service_core::error::AppError;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Scope of one reconcile run.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub company_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub mode: ReconcileMode,
}

/// Everything a caller gets back from one run.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub summary: ReconcileSummary,
    /// Decisions whose writes were actually applied.
    pub decisions: Vec<MatchDecision>,
    /// Decisions whose writes failed; retry can be scoped to these.
    pub partial_failures: Vec<ApplyFailure>,
}

pub struct Reconciler {
    apply_concurrency: usize,
    run_deadline: Option<Duration>,
}

impl Reconciler {
    pub fn new(apply_concurrency: usize, run_deadline: Option<Duration>) -> Self {
        Self {
            apply_concurrency: apply_concurrency.max(1),
            run_deadline,
        }
    }

    /// Execute one reconcile run against the given store.
    ///
    /// A fetch failure aborts the whole run before anything is written. An
    /// individual apply failure is collected and the remaining decisions
    /// still go through. A stale conflict (another run claimed the record
    /// first) is a silent no-op and is not counted as matched.
    #[instrument(
        skip(self, store),
        fields(company_id = %request.company_id, mode = request.mode.as_str())
    )]
    pub async fn run(
        &self,
        store: &dyn ReconciliationStore,
        request: &ReconcileRequest,
    ) -> Result<ReconcileOutcome, AppError> {
        if request.company_id.is_nil() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "company_id is required"
            )));
        }
        if request.mode == ReconcileMode::Statement && request.statement_id.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "statement_id is required for statement reconciliation"
            )));
        }

        let started_utc = Utc::now();

        let (transactions, candidates) = match request.mode {
            ReconcileMode::Receipts => {
                let (transactions, receipts) = tokio::try_join!(
                    store.unmatched_debit_transactions(request.company_id, request.statement_id),
                    store.unmatched_receipts(request.company_id),
                )?;
                let candidates: Vec<MatchCandidate> =
                    receipts.iter().map(MatchCandidate::from).collect();
                (transactions, candidates)
            }
            ReconcileMode::Statement => {
                let (transactions, expenses) = tokio::try_join!(
                    store.unmatched_debit_transactions(request.company_id, request.statement_id),
                    store.active_expenses(request.company_id),
                )?;
                let candidates: Vec<MatchCandidate> =
                    expenses.iter().map(MatchCandidate::from).collect();
                (transactions, candidates)
            }
        };

        info!(
            transactions = transactions.len(),
            candidates = candidates.len(),
            "Candidate snapshot fetched"
        );

        let decisions = match_candidates(&transactions, &candidates, request.mode);

        let deadline = self
            .run_deadline
            .map(|d| tokio::time::Instant::now() + d);

        let mut applied = Vec::new();
        let mut partial_failures = Vec::new();
        let mut stale_conflicts = 0usize;

        {
            let company_id = request.company_id;
            let mode = request.mode;
            let mut applies = futures::stream::iter(decisions.into_iter().map(|decision| {
                async move {
                    let result = store.apply_match(company_id, &decision, mode).await;
                    (decision, result)
                }
            }))
            .buffer_unordered(self.apply_concurrency);

            loop {
                let next = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, applies.next()).await {
                        Ok(item) => item,
                        Err(_) => {
                            warn!("Run deadline exceeded; reporting completed writes only");
                            record_error("deadline_exceeded");
                            break;
                        }
                    },
                    None => applies.next().await,
                };
                let Some((decision, result)) = next else {
                    break;
                };

                match result {
                    Ok(ApplyOutcome::Applied) => {
                        record_transaction_match(decision.confidence.as_str());
                        debug!(
                            transaction_id = %decision.transaction_id,
                            counterpart_id = %decision.counterpart_id,
                            confidence = decision.confidence.as_str(),
                            "Match applied"
                        );
                        applied.push(decision);
                    }
                    Ok(ApplyOutcome::StaleConflict) => {
                        stale_conflicts += 1;
                        debug!(
                            transaction_id = %decision.transaction_id,
                            "Record already claimed by a concurrent run; skipping"
                        );
                    }
                    Err(e) => {
                        record_error("apply_match");
                        warn!(
                            transaction_id = %decision.transaction_id,
                            error = %e,
                            "Failed to apply match"
                        );
                        partial_failures.push(ApplyFailure {
                            transaction_id: decision.transaction_id,
                            counterpart_id: decision.counterpart_id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let matched_count = applied
            .iter()
            .filter(|d| d.confidence != MatchConfidence::Discrepancy)
            .count() as i32;
        let discrepancy_count = applied.len() as i32 - matched_count;
        let total_candidates = transactions.len() as i32;
        let summary = ReconcileSummary {
            total_candidates,
            matched_count,
            discrepancy_count,
            unmatched_count: total_candidates - matched_count - discrepancy_count,
        };

        let record = RunRecord {
            run_id: Uuid::new_v4(),
            company_id: request.company_id,
            statement_id: request.statement_id,
            mode: request.mode.as_str().to_string(),
            total_candidates: summary.total_candidates,
            matched_count: summary.matched_count,
            discrepancy_count: summary.discrepancy_count,
            unmatched_count: summary.unmatched_count,
            started_utc,
            completed_utc: Utc::now(),
        };
        if let Err(e) = store.record_run(&record).await {
            warn!(error = %e, "Failed to record run summary");
            record_error("record_run");
        }

        record_reconcile_run(request.mode.as_str(), "completed");
        info!(
            matched = summary.matched_count,
            discrepancies = summary.discrepancy_count,
            unmatched = summary.unmatched_count,
            stale_conflicts = stale_conflicts,
            failures = partial_failures.len(),
            "Reconcile run finished"
        );

        Ok(ReconcileOutcome {
            summary,
            decisions: applied,
            partial_failures,
        })
    }
}
