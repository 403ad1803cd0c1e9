use crate::dtos::{ReconcileRequestDto, ReconcileResponse, RunListParams, RunListResponse};
use crate::middleware::CompanyId;
use crate::models::ReconcileMode;
use crate::repository::ReconciliationStore;
use crate::services::ReconcileRequest;
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

/// Run reconciliation for the calling company.
pub async fn reconcile(
    State(state): State<AppState>,
    company: CompanyId,
    Json(dto): Json<ReconcileRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    dto.validate()?;

    let mode = ReconcileMode::from_str(&dto.mode).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown mode '{}': expected 'receipts' or 'statement'",
            dto.mode
        ))
    })?;

    let request = ReconcileRequest {
        company_id: company.0,
        statement_id: dto.statement_id,
        mode,
    };

    let outcome = state.reconciler.run(state.store.as_ref(), &request).await?;

    Ok(Json(ReconcileResponse {
        summary: outcome.summary,
        decisions: outcome.decisions,
        partial_failures: outcome.partial_failures,
    }))
}

/// List recent reconcile runs for the calling company.
pub async fn list_runs(
    State(state): State<AppState>,
    company: CompanyId,
    Query(params): Query<RunListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page_size = params.page_size.unwrap_or(20);
    let (runs, next_page_token) = state
        .store
        .list_runs(company.0, page_size, params.page_token)
        .await?;

    Ok(Json(RunListResponse {
        runs,
        next_page_token,
    }))
}
