//! In-memory store used by tests and local experiments.
//!
//! Reproduces the Postgres store's contract exactly: company scoping,
//! eligibility filters, stable ordering, and conditional claim semantics.

use crate::models::{
    BankTransaction, CompanyExpense, MatchDecision, Receipt, ReconcileMode, RunRecord,
};
use crate::repository::{ApplyOutcome, CandidateRepository, DecisionApplier, ReconciliationStore};
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    transactions: Vec<BankTransaction>,
    receipts: Vec<Receipt>,
    expenses: Vec<CompanyExpense>,
    runs: Vec<RunRecord>,
    failing_transactions: HashSet<Uuid>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transaction(&self, transaction: BankTransaction) {
        self.inner.lock().unwrap().transactions.push(transaction);
    }

    pub fn insert_receipt(&self, receipt: Receipt) {
        self.inner.lock().unwrap().receipts.push(receipt);
    }

    pub fn insert_expense(&self, expense: CompanyExpense) {
        self.inner.lock().unwrap().expenses.push(expense);
    }

    /// Make every apply targeting this transaction fail with a storage error.
    pub fn fail_applies_for(&self, transaction_id: Uuid) {
        self.inner
            .lock()
            .unwrap()
            .failing_transactions
            .insert(transaction_id);
    }

    pub fn transaction(&self, transaction_id: Uuid) -> Option<BankTransaction> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned()
    }

    pub fn receipt(&self, receipt_id: Uuid) -> Option<Receipt> {
        self.inner
            .lock()
            .unwrap()
            .receipts
            .iter()
            .find(|r| r.receipt_id == receipt_id)
            .cloned()
    }

    pub fn run_count(&self) -> usize {
        self.inner.lock().unwrap().runs.len()
    }
}

#[async_trait]
impl CandidateRepository for InMemoryStore {
    async fn unmatched_debit_transactions(
        &self,
        company_id: Uuid,
        statement_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let state = self.inner.lock().unwrap();
        let mut rows: Vec<BankTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.company_id == company_id)
            .filter(|t| t.status == "unmatched")
            .filter(|t| t.amount < rust_decimal::Decimal::ZERO)
            .filter(|t| statement_id.is_none() || t.statement_id == statement_id)
            .cloned()
            .collect();
        // Same order the SQL store imposes: date ascending, nulls last, id tiebreak.
        rows.sort_by(|a, b| {
            match (a.transaction_date, b.transaction_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then(a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(rows)
    }

    async fn unmatched_receipts(&self, company_id: Uuid) -> Result<Vec<Receipt>, AppError> {
        let state = self.inner.lock().unwrap();
        let mut rows: Vec<Receipt> = state
            .receipts
            .iter()
            .filter(|r| r.company_id == company_id)
            .filter(|r| r.matched_transaction_id.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            match (a.receipt_date, b.receipt_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then(a.receipt_id.cmp(&b.receipt_id))
        });
        Ok(rows)
    }

    async fn active_expenses(&self, company_id: Uuid) -> Result<Vec<CompanyExpense>, AppError> {
        let state = self.inner.lock().unwrap();
        let mut rows: Vec<CompanyExpense> = state
            .expenses
            .iter()
            .filter(|e| e.company_id == company_id)
            .filter(|e| e.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.expense_id.cmp(&b.expense_id)));
        Ok(rows)
    }
}

#[async_trait]
impl DecisionApplier for InMemoryStore {
    async fn apply_match(
        &self,
        company_id: Uuid,
        decision: &MatchDecision,
        mode: ReconcileMode,
    ) -> Result<ApplyOutcome, AppError> {
        let mut state = self.inner.lock().unwrap();

        if state.failing_transactions.contains(&decision.transaction_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected write failure for transaction {}",
                decision.transaction_id
            )));
        }

        let Some(txn_index) = state.transactions.iter().position(|t| {
            t.company_id == company_id && t.transaction_id == decision.transaction_id
        }) else {
            return Ok(ApplyOutcome::StaleConflict);
        };
        if state.transactions[txn_index].status != "unmatched" {
            return Ok(ApplyOutcome::StaleConflict);
        }

        let receipt_index = if mode == ReconcileMode::Receipts {
            let Some(index) = state.receipts.iter().position(|r| {
                r.company_id == company_id && r.receipt_id == decision.counterpart_id
            }) else {
                return Ok(ApplyOutcome::StaleConflict);
            };
            if state.receipts[index].matched_transaction_id.is_some() {
                return Ok(ApplyOutcome::StaleConflict);
            }
            Some(index)
        } else {
            None
        };

        let txn = &mut state.transactions[txn_index];
        txn.status = decision.confidence.status().as_str().to_string();
        txn.matched_counterpart_id = Some(decision.counterpart_id);
        txn.match_note = Some(decision.explanation.clone());

        if let Some(index) = receipt_index {
            state.receipts[index].matched_transaction_id = Some(decision.transaction_id);
        }

        Ok(ApplyOutcome::Applied)
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn record_run(&self, record: &RunRecord) -> Result<(), AppError> {
        self.inner.lock().unwrap().runs.push(record.clone());
        Ok(())
    }

    async fn list_runs(
        &self,
        company_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<RunRecord>, Option<Uuid>), AppError> {
        let state = self.inner.lock().unwrap();
        let limit = page_size.clamp(1, 100) as usize;
        let mut runs: Vec<RunRecord> = state
            .runs
            .iter()
            .filter(|r| r.company_id == company_id)
            .filter(|r| page_token.map_or(true, |cursor| r.run_id > cursor))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));

        let has_more = runs.len() > limit;
        runs.truncate(limit);
        let next_token = if has_more {
            runs.last().map(|r| r.run_id)
        } else {
            None
        };
        Ok((runs, next_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchConfidence;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn unmatched_debit(company_id: Uuid) -> BankTransaction {
        BankTransaction {
            transaction_id: Uuid::new_v4(),
            company_id,
            statement_id: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            description: "CARD PURCHASE".to_string(),
            transaction_type: "debit".to_string(),
            check_number: None,
            amount: Decimal::new(-4500, 2),
            status: "unmatched".to_string(),
            matched_counterpart_id: None,
            match_note: None,
            created_utc: Utc::now(),
        }
    }

    fn unclaimed_receipt(company_id: Uuid) -> Receipt {
        Receipt {
            receipt_id: Uuid::new_v4(),
            company_id,
            vendor: "Corner Market".to_string(),
            amount: Some(Decimal::new(4500, 2)),
            receipt_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            matched_transaction_id: None,
            created_utc: Utc::now(),
        }
    }

    fn decision(transaction_id: Uuid, counterpart_id: Uuid) -> MatchDecision {
        MatchDecision {
            transaction_id,
            counterpart_id,
            confidence: MatchConfidence::High,
            explanation: "Corner Market: 45.00 matches expected 45.00".to_string(),
        }
    }

    #[tokio::test]
    async fn retrying_an_applied_decision_is_a_no_op() {
        let store = InMemoryStore::new();
        let company_id = Uuid::new_v4();
        let txn = unmatched_debit(company_id);
        let slip = unclaimed_receipt(company_id);
        store.insert_transaction(txn.clone());
        store.insert_receipt(slip.clone());

        let d = decision(txn.transaction_id, slip.receipt_id);
        let first = store
            .apply_match(company_id, &d, ReconcileMode::Receipts)
            .await
            .unwrap();
        assert_eq!(first, ApplyOutcome::Applied);

        let second = store
            .apply_match(company_id, &d, ReconcileMode::Receipts)
            .await
            .unwrap();
        assert_eq!(second, ApplyOutcome::StaleConflict);

        let stored = store.transaction(txn.transaction_id).unwrap();
        assert_eq!(stored.status, "matched");
        assert_eq!(stored.matched_counterpart_id, Some(slip.receipt_id));
    }

    #[tokio::test]
    async fn losing_the_receipt_race_leaves_the_transaction_untouched() {
        let store = InMemoryStore::new();
        let company_id = Uuid::new_v4();
        let txn = unmatched_debit(company_id);
        let mut slip = unclaimed_receipt(company_id);
        // A concurrent run claimed the receipt after our snapshot was taken.
        slip.matched_transaction_id = Some(Uuid::new_v4());
        store.insert_transaction(txn.clone());
        store.insert_receipt(slip.clone());

        let outcome = store
            .apply_match(
                company_id,
                &decision(txn.transaction_id, slip.receipt_id),
                ReconcileMode::Receipts,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::StaleConflict);

        let stored = store.transaction(txn.transaction_id).unwrap();
        assert_eq!(stored.status, "unmatched");
        assert!(stored.matched_counterpart_id.is_none());
    }

    #[tokio::test]
    async fn statement_mode_never_touches_the_expense() {
        let store = InMemoryStore::new();
        let company_id = Uuid::new_v4();
        let txn = unmatched_debit(company_id);
        store.insert_transaction(txn.clone());
        let expense_id = Uuid::new_v4();

        let outcome = store
            .apply_match(
                company_id,
                &decision(txn.transaction_id, expense_id),
                ReconcileMode::Statement,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let stored = store.transaction(txn.transaction_id).unwrap();
        assert_eq!(stored.status, "matched");
        assert_eq!(stored.matched_counterpart_id, Some(expense_id));
    }
}
