use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{period_bounds, BudgetPeriod, ReportFilter, UsageRecord, UsageSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub project: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl UsageQuery {
    fn into_filter(self) -> ReportFilter {
        ReportFilter {
            provider: self.provider.filter(|s| !s.is_empty()),
            model: self.model.filter(|s| !s.is_empty()),
            project: self.project.filter(|s| !s.is_empty()),
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub records: Vec<UsageRecord>,
    pub count: usize,
}

/// GET /api/v1/usage
///
/// Raw usage records matching the filter, newest first.
pub async fn query_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, AppError> {
    let records = state.tracker.query(&query.into_filter())?;
    let count = records.len();
    Ok(Json(UsageResponse { records, count }))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub period: Option<BudgetPeriod>,
    pub provider: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub period: BudgetPeriod,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: UsageSummary,
}

/// GET /api/v1/summary
///
/// Aggregate over the current period window. Defaults to daily.
pub async fn usage_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    let period = query.period.unwrap_or(BudgetPeriod::Daily);
    let (start, end) = period_bounds(period);

    let filter = ReportFilter {
        provider: query.provider.filter(|s| !s.is_empty()),
        model: None,
        project: query.project.filter(|s| !s.is_empty()),
        start: Some(start),
        end: Some(end),
    };
    let summary = state.tracker.report(&filter)?;

    Ok(Json(SummaryResponse {
        period,
        start,
        end,
        summary,
    }))
}
