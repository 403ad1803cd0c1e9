//! Request/response DTOs for the HTTP surface.

use crate::models::{ApplyFailure, MatchDecision, ReconcileSummary, RunRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileRequestDto {
    /// `receipts` or `statement`.
    #[validate(length(min = 1, message = "mode is required"))]
    pub mode: String,

    /// Restricts the run to one uploaded statement. Required in statement
    /// mode, optional in receipts mode.
    pub statement_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub summary: ReconcileSummary,
    pub decisions: Vec<MatchDecision>,
    pub partial_failures: Vec<ApplyFailure>,
}

#[derive(Debug, Deserialize)]
pub struct RunListParams {
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}
