use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::ledger;
use crate::models::Provider;
use crate::orchestrator::{self, OutcomeStatus};
use crate::web::{AppState, FanoutResponse, IngestResponse};

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Trigger one provider's ingestion job. 200 with a populated report on
/// success or partial success; 500 only when the job failed before any
/// partial results exist.
pub async fn ingest_provider(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    let Some(extractor) = state.ctx.extractor_by_slug(&slug) else {
        return (
            StatusCode::NOT_FOUND,
            Json(IngestResponse::fatal(format!("unknown provider '{}'", slug))),
        );
    };

    info!(provider = %slug, "ingestion triggered");
    let report = orchestrator::run_provider_job(&state.ctx, extractor).await;

    if report.is_fatal() {
        let error = report.errors.join("; ");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(IngestResponse::fatal(error)));
    }
    (StatusCode::OK, Json(IngestResponse::from_report(report)))
}

/// Trigger all provider jobs. 200 when every job succeeded, 207 when
/// any failed.
pub async fn ingest_all(State(state): State<AppState>) -> impl IntoResponse {
    let outcomes = orchestrator::run_all(&state.ctx).await;

    let failed = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Error)
        .count();
    let status = if failed == 0 {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    let message = if failed == 0 {
        format!("all {} provider jobs succeeded", outcomes.len())
    } else {
        format!("{} of {} provider jobs failed", failed, outcomes.len())
    };

    (
        status,
        Json(FanoutResponse {
            message,
            results: outcomes,
        }),
    )
}

/// All known providers, ordered by slug.
pub async fn providers(
    State(state): State<AppState>,
) -> Result<Json<Vec<Provider>>, (StatusCode, Json<serde_json::Value>)> {
    let providers = crate::catalog::list_providers(&state.ctx.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(providers))
}

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    pub provider: Option<String>,
    pub gpu_model_id: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub days: u32,
    pub points: Vec<ledger::TrendPoint>,
}

/// Daily average prices over a bounded window; `days` is clamped to
/// [1, 90] regardless of the requested value.
pub async fn price_trends(
    State(state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<TrendResponse>, (StatusCode, Json<serde_json::Value>)> {
    let days = ledger::clamp_trend_days(params.days.unwrap_or(30));

    let provider_id = match &params.provider {
        Some(slug) => {
            let provider = crate::catalog::provider_by_slug(&state.ctx.pool, slug)
                .await
                .map_err(internal_error)?;
            match provider {
                Some(p) => Some(p.id),
                None => {
                    return Err((
                        StatusCode::NOT_FOUND,
                        Json(json!({ "error": format!("unknown provider '{}'", slug) })),
                    ))
                }
            }
        }
        None => None,
    };

    let points = ledger::price_trend(
        &state.ctx.pool,
        provider_id.as_deref(),
        params.gpu_model_id.as_deref(),
        days,
    )
    .await
    .map_err(internal_error)?;

    Ok(Json(TrendResponse { days, points }))
}

fn internal_error(e: crate::utils::error::AppError) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}
