//! Domain models for the reconciliation engine.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Bank Transaction Models
// ============================================================================

/// Match state of a bank transaction. Stored as text in Postgres.
///
/// A transaction leaves `unmatched` at most once per reconcile run and this
/// engine never moves it back (manual unmatching lives outside the engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    Matched,
    Discrepancy,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Discrepancy => "discrepancy",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "unmatched" => Self::Unmatched,
            "matched" => Self::Matched,
            "discrepancy" => Self::Discrepancy,
            _ => Self::Unmatched,
        }
    }
}

/// One row from a bank feed or a parsed statement line.
///
/// `amount` is signed: negative means money left the account. Only negative
/// amounts are ever considered for matching; deposits are never candidates.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub company_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub transaction_date: Option<NaiveDate>,
    pub description: String,
    pub transaction_type: String,
    pub check_number: Option<String>,
    pub amount: Decimal,
    pub status: String,
    pub matched_counterpart_id: Option<Uuid>,
    pub match_note: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn status(&self) -> MatchStatus {
        MatchStatus::from_str(&self.status)
    }

    /// Whether the algorithm may consider this transaction at all.
    pub fn is_matchable(&self) -> bool {
        self.transaction_date.is_some() && self.amount < Decimal::ZERO
    }
}

// ============================================================================
// Receipt Models
// ============================================================================

/// A captured purchase record, from OCR extraction or manual entry.
///
/// Amount and date are optional because extraction can fail; such receipts
/// stay on file but never participate in matching.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub company_id: Uuid,
    pub vendor: String,
    pub amount: Option<Decimal>,
    pub receipt_date: Option<NaiveDate>,
    pub matched_transaction_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Company Expense Models
// ============================================================================

/// A recurring or scheduled expense definition (rent, subscription, payroll).
///
/// Read-only to this engine: an expense is a reusable schedule, not a
/// one-time record, so matching never mutates it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompanyExpense {
    pub expense_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub start_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Matching Models
// ============================================================================

/// Which second data source a reconcile run pairs transactions against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Pair debits against unmatched receipts.
    Receipts,
    /// Pair one statement's debits against active scheduled expenses.
    Statement,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipts => "receipts",
            Self::Statement => "statement",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipts" => Some(Self::Receipts),
            "statement" => Some(Self::Statement),
            _ => None,
        }
    }
}

/// Confidence tier assigned to a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    High,
    Medium,
    Discrepancy,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Discrepancy => "discrepancy",
        }
    }

    /// The transaction status a decision of this confidence results in.
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::High | Self::Medium => MatchStatus::Matched,
            Self::Discrepancy => MatchStatus::Discrepancy,
        }
    }
}

/// Mode-erased view of a match candidate (receipt or expense).
///
/// The matching algorithm only needs an identity, an amount, a calendar date
/// and a display label; erasing the source type keeps it a single pure
/// function for both run modes.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub candidate_id: Uuid,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub label: String,
}

impl From<&Receipt> for MatchCandidate {
    fn from(r: &Receipt) -> Self {
        Self {
            candidate_id: r.receipt_id,
            amount: r.amount,
            date: r.receipt_date,
            label: r.vendor.clone(),
        }
    }
}

impl From<&CompanyExpense> for MatchCandidate {
    fn from(e: &CompanyExpense) -> Self {
        Self {
            candidate_id: e.expense_id,
            amount: Some(e.amount),
            date: e.start_date,
            label: e.name.clone(),
        }
    }
}

/// One pairing produced by the matching algorithm.
///
/// Transient: translated into field updates on the transaction (and receipt,
/// in receipt mode), never persisted as its own entity.
#[derive(Debug, Clone, Serialize)]
pub struct MatchDecision {
    pub transaction_id: Uuid,
    pub counterpart_id: Uuid,
    pub confidence: MatchConfidence,
    pub explanation: String,
}

// ============================================================================
// Run Summary Models
// ============================================================================

/// Counts returned to the caller after a reconcile run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileSummary {
    pub total_candidates: i32,
    pub matched_count: i32,
    pub discrepancy_count: i32,
    pub unmatched_count: i32,
}

/// A decision whose write could not be applied; reported so a retry can be
/// scoped to just these identifiers.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyFailure {
    pub transaction_id: Uuid,
    pub counterpart_id: Uuid,
    pub error: String,
}

/// Persisted record of one completed reconcile run.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub company_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub mode: String,
    pub total_candidates: i32,
    pub matched_count: i32,
    pub discrepancy_count: i32,
    pub unmatched_count: i32,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: DateTime<Utc>,
}
