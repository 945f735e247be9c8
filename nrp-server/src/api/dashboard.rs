//! GET /dashboard

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::MonthlyAggregate;
use crate::services::{aggregate, normalizer::is_month_shape};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub month: Option<String>,
}

/// GET /dashboard?month=YYYY-MM
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<MonthlyAggregate>> {
    let month = query
        .month
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("month is required (YYYY-MM)".to_string()))?;

    if !is_month_shape(&month) {
        return Err(ApiError::BadRequest("month must be YYYY-MM".to_string()));
    }

    let summary = aggregate(state.reports.as_ref(), &month).await?;
    Ok(Json(summary))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}
