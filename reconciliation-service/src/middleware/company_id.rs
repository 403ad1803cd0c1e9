//! Company scope extraction for the multi-tenant HTTP surface.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;

/// Company scope for a request, taken from the `X-Company-Id` header set by
/// the authenticating frontend. Every query the engine issues is bound to
/// this id; a request without it is rejected before any fetch happens.
#[derive(Debug, Clone, Copy)]
pub struct CompanyId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CompanyId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Company-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing X-Company-Id header"))
            })?;

        let company_id = Uuid::from_str(raw)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid X-Company-Id header")))?;

        tracing::Span::current().record("company_id", raw);

        Ok(CompanyId(company_id))
    }
}
