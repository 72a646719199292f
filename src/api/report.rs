use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;
use crate::orchestration::ReportRequest;
use crate::report::{conversions_csv, Report};

pub async fn post_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<Report>, AppError> {
    let report = state.runner.run(&request).await?;
    Ok(Json(report))
}

pub async fn post_report_csv(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.runner.run(&request).await?;
    let body = conversions_csv(&report.records)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}
