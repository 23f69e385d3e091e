use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{Budget, BudgetPeriod};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    pub name: String,
    pub limit_usd: f64,
    pub period: BudgetPeriod,
    #[serde(default = "default_threshold")]
    pub alert_threshold_pct: f64,
}

fn default_threshold() -> f64 {
    80.0
}

/// PUT /api/v1/budgets
///
/// Create or update a budget by name. Updating never touches the running
/// spend accumulator.
pub async fn set_budget(
    State(state): State<AppState>,
    Json(req): Json<SetBudgetRequest>,
) -> Result<(StatusCode, Json<Budget>), AppError> {
    if req.name.is_empty() {
        return Err(AppError::BadRequest("budget name is required".to_string()));
    }
    if req.limit_usd < 0.0 {
        return Err(AppError::BadRequest(
            "budget limit must not be negative".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&req.alert_threshold_pct) {
        return Err(AppError::BadRequest(
            "alert threshold must be between 0 and 100".to_string(),
        ));
    }

    let mut budget = Budget {
        id: String::new(),
        name: req.name,
        limit_usd: req.limit_usd,
        period: req.period,
        current_spend: 0.0,
        alert_threshold_pct: req.alert_threshold_pct,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    state.tracker.storage().set_budget(&mut budget)?;

    // Re-read so the response reflects the stored spend on updates.
    let stored = state.tracker.storage().get_budget(&budget.name)?;
    Ok((StatusCode::OK, Json(stored)))
}

#[derive(Debug, Serialize)]
pub struct BudgetListResponse {
    pub budgets: Vec<Budget>,
}

/// GET /api/v1/budgets
pub async fn list_budgets(
    State(state): State<AppState>,
) -> Result<Json<BudgetListResponse>, AppError> {
    let budgets = state.tracker.storage().list_budgets()?;
    Ok(Json(BudgetListResponse { budgets }))
}

/// GET /api/v1/budgets/{name}
pub async fn get_budget(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Budget>, AppError> {
    let budget = state.tracker.storage().get_budget(&name)?;
    Ok(Json(budget))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub name: String,
    pub reset: bool,
}

/// POST /api/v1/budgets/{name}/reset
///
/// Period rollover: zeroes the spend accumulator via a negative delta.
pub async fn reset_budget(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    state.tracker.budgets().reset(&name).await?;
    Ok(Json(ResetResponse { name, reset: true }))
}
