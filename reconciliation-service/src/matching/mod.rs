//! The matching algorithm: pairs unmatched bank debits with candidates.
//!
//! Pure and synchronous; all I/O stays in the orchestrator. Transactions are
//! scanned in the order the repository supplies them (date ascending, id as
//! tiebreak), candidates likewise, and the first candidate that satisfies a
//! rule claims the pairing. Re-running over unchanged input therefore
//! reproduces identical output. First-match-wins is deliberate: a globally
//! optimal assignment would trade determinism and latency for a marginally
//! higher match rate.

use crate::models::{BankTransaction, MatchCandidate, MatchConfidence, MatchDecision, ReconcileMode};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// Relative amount tolerance for a same-day exact match.
static EXACT_AMOUNT_TOLERANCE: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 2));

/// Relative amount tolerance for a close match (receipt mode).
static CLOSE_AMOUNT_TOLERANCE: Lazy<Decimal> = Lazy::new(|| Decimal::new(5, 2));

/// Whole-day window for a close match (receipt mode).
const CLOSE_DATE_WINDOW_DAYS: i64 = 3;

/// Whole-day window for flagging an amount discrepancy (statement mode).
const DISCREPANCY_DATE_WINDOW_DAYS: i64 = 1;

/// Pair transactions with candidates, at most one match per record.
///
/// Both claim sets span the whole run: a claimed candidate is out of play for
/// every later transaction, and duplicate rows in either input cannot produce
/// a second decision. The output length never exceeds
/// `min(transactions.len(), candidates.len())`.
pub fn match_candidates(
    transactions: &[BankTransaction],
    candidates: &[MatchCandidate],
    mode: ReconcileMode,
) -> Vec<MatchDecision> {
    let mut claimed_transactions: HashSet<Uuid> = HashSet::new();
    let mut claimed_candidates: HashSet<Uuid> = HashSet::new();
    let mut decisions = Vec::new();

    for txn in transactions {
        if claimed_transactions.contains(&txn.transaction_id) {
            continue;
        }
        // Credits, zero amounts and dateless rows are never matchable.
        if !txn.is_matchable() {
            continue;
        }
        let Some(txn_date) = txn.transaction_date else {
            continue;
        };
        let txn_amount = txn.amount.abs();

        for candidate in candidates {
            if claimed_candidates.contains(&candidate.candidate_id) {
                continue;
            }
            let Some((confidence, explanation)) =
                evaluate_pair(txn_date, txn_amount, candidate, mode)
            else {
                continue;
            };

            claimed_transactions.insert(txn.transaction_id);
            claimed_candidates.insert(candidate.candidate_id);
            decisions.push(MatchDecision {
                transaction_id: txn.transaction_id,
                counterpart_id: candidate.candidate_id,
                confidence,
                explanation,
            });
            break;
        }
    }

    decisions
}

/// Evaluate one (transaction, candidate) pair, most specific rule first.
///
/// Tolerances are relative to the candidate amount; a candidate without a
/// positive amount or a usable date can never divide or diff, so it is
/// skipped rather than crashed on.
fn evaluate_pair(
    txn_date: chrono::NaiveDate,
    txn_amount: Decimal,
    candidate: &MatchCandidate,
    mode: ReconcileMode,
) -> Option<(MatchConfidence, String)> {
    let expected = candidate.amount?;
    if expected <= Decimal::ZERO {
        return None;
    }
    let expected_date = candidate.date?;

    let day_distance = (txn_date - expected_date).num_days().abs();
    let relative_diff = (txn_amount - expected).abs() / expected;

    if day_distance == 0 && relative_diff <= *EXACT_AMOUNT_TOLERANCE {
        return Some((
            MatchConfidence::High,
            format!(
                "{}: {} matches expected {} on {}",
                candidate.label, txn_amount, expected, expected_date
            ),
        ));
    }

    match mode {
        ReconcileMode::Receipts => {
            if day_distance <= CLOSE_DATE_WINDOW_DAYS && relative_diff <= *CLOSE_AMOUNT_TOLERANCE {
                Some((
                    MatchConfidence::Medium,
                    format!(
                        "{}: {} close to expected {}, {} day(s) apart",
                        candidate.label, txn_amount, expected, day_distance
                    ),
                ))
            } else {
                None
            }
        }
        ReconcileMode::Statement => {
            if day_distance <= DISCREPANCY_DATE_WINDOW_DAYS
                && relative_diff > *EXACT_AMOUNT_TOLERANCE
            {
                Some((
                    MatchConfidence::Discrepancy,
                    format!(
                        "{}: statement amount {} differs from expected {}",
                        candidate.label, txn_amount, expected
                    ),
                ))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn amount(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn debit(on: &str, amt: &str) -> BankTransaction {
        BankTransaction {
            transaction_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            statement_id: None,
            transaction_date: Some(date(on)),
            description: "CARD PURCHASE".to_string(),
            transaction_type: "debit".to_string(),
            check_number: None,
            amount: amount(amt),
            status: "unmatched".to_string(),
            matched_counterpart_id: None,
            match_note: None,
            created_utc: Utc::now(),
        }
    }

    fn candidate(on: &str, amt: &str) -> MatchCandidate {
        MatchCandidate {
            candidate_id: Uuid::new_v4(),
            amount: Some(amount(amt)),
            date: Some(date(on)),
            label: "Acme Supplies".to_string(),
        }
    }

    #[test]
    fn same_day_within_one_percent_is_high_confidence() {
        let txns = vec![debit("2024-01-05", "-100.99")];
        let cands = vec![candidate("2024-01-05", "100.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].confidence, MatchConfidence::High);
        assert_eq!(decisions[0].transaction_id, txns[0].transaction_id);
        assert_eq!(decisions[0].counterpart_id, cands[0].candidate_id);
    }

    #[test]
    fn just_over_one_percent_drops_to_medium_on_same_day() {
        let txns = vec![debit("2024-01-05", "-101.01")];
        let cands = vec![candidate("2024-01-05", "100.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].confidence, MatchConfidence::Medium);
    }

    #[test]
    fn six_percent_difference_matches_nothing() {
        let txns = vec![debit("2024-01-05", "-106.00")];
        let cands = vec![candidate("2024-01-05", "100.00")];

        assert!(match_candidates(&txns, &cands, ReconcileMode::Receipts).is_empty());
    }

    #[test]
    fn three_day_window_allows_close_match() {
        let txns = vec![debit("2024-01-08", "-104.00")];
        let cands = vec![candidate("2024-01-05", "100.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].confidence, MatchConfidence::Medium);
    }

    #[test]
    fn four_days_apart_is_no_match() {
        let txns = vec![debit("2024-01-09", "-104.00")];
        let cands = vec![candidate("2024-01-05", "100.00")];

        assert!(match_candidates(&txns, &cands, ReconcileMode::Receipts).is_empty());
    }

    #[test]
    fn statement_mode_flags_amount_discrepancy() {
        let txns = vec![debit("2024-02-01", "-110.00")];
        let cands = vec![candidate("2024-02-01", "100.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Statement);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].confidence, MatchConfidence::Discrepancy);
        assert!(decisions[0].explanation.contains("110.00"));
        assert!(decisions[0].explanation.contains("100.00"));
    }

    #[test]
    fn statement_mode_next_day_within_tolerance_stays_unmatched() {
        // Not an exact match (different day) and not a discrepancy (amount
        // agrees within tolerance): no decision at all.
        let txns = vec![debit("2024-02-02", "-100.50")];
        let cands = vec![candidate("2024-02-01", "100.00")];

        assert!(match_candidates(&txns, &cands, ReconcileMode::Statement).is_empty());
    }

    #[test]
    fn statement_mode_has_no_close_match_rule() {
        let txns = vec![debit("2024-02-03", "-104.00")];
        let cands = vec![candidate("2024-02-01", "100.00")];

        assert!(match_candidates(&txns, &cands, ReconcileMode::Statement).is_empty());
    }

    #[test]
    fn zero_amount_candidate_is_never_matchable() {
        let txns = vec![debit("2024-01-05", "-100.00")];
        let mut zero = candidate("2024-01-05", "0.00");
        zero.amount = Some(Decimal::ZERO);

        assert!(match_candidates(&txns, &[zero], ReconcileMode::Receipts).is_empty());
    }

    #[test]
    fn amountless_and_dateless_candidates_are_skipped() {
        let txns = vec![debit("2024-01-05", "-100.00")];
        let mut no_amount = candidate("2024-01-05", "100.00");
        no_amount.amount = None;
        let mut no_date = candidate("2024-01-05", "100.00");
        no_date.date = None;

        assert!(match_candidates(&txns, &[no_amount, no_date], ReconcileMode::Receipts).is_empty());
    }

    #[test]
    fn credits_and_dateless_transactions_are_ignored() {
        let deposit = debit("2024-01-05", "100.00");
        let mut dateless = debit("2024-01-05", "-100.00");
        dateless.transaction_date = None;
        let cands = vec![candidate("2024-01-05", "100.00")];

        assert!(match_candidates(&[deposit, dateless], &cands, ReconcileMode::Receipts).is_empty());
    }

    #[test]
    fn first_candidate_wins_and_loser_stays_available() {
        let txns = vec![debit("2024-01-05", "-50.00"), debit("2024-01-05", "-50.00")];
        let cands = vec![candidate("2024-01-05", "50.00"), candidate("2024-01-05", "50.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].counterpart_id, cands[0].candidate_id);
        assert_eq!(decisions[1].counterpart_id, cands[1].candidate_id);
    }

    #[test]
    fn claimed_candidate_is_out_of_play_for_later_transactions() {
        let txns = vec![debit("2024-01-05", "-50.00"), debit("2024-01-05", "-50.00")];
        let cands = vec![candidate("2024-01-05", "50.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].transaction_id, txns[0].transaction_id);
    }

    #[test]
    fn duplicate_transaction_rows_cannot_double_match() {
        let txn = debit("2024-01-05", "-50.00");
        let txns = vec![txn.clone(), txn];
        let cands = vec![candidate("2024-01-05", "50.00"), candidate("2024-01-05", "50.00")];

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn decision_count_never_exceeds_smaller_input() {
        let txns: Vec<_> = (0..5).map(|_| debit("2024-01-05", "-50.00")).collect();
        let cands: Vec<_> = (0..2).map(|_| candidate("2024-01-05", "50.00")).collect();

        let decisions = match_candidates(&txns, &cands, ReconcileMode::Receipts);
        assert_eq!(decisions.len(), 2);

        let counterparts: HashSet<_> = decisions.iter().map(|d| d.counterpart_id).collect();
        assert_eq!(counterparts.len(), decisions.len());
    }
}
