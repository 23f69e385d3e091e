pub mod budget;
pub mod health;
pub mod report;
pub mod track;

use axum::routing::{get, post, put};
use axum::Router;

use crate::AppState;

/// Build the reporting/admin API router.
///
/// Route layout:
/// ```text
/// /healthz                        GET
/// /api/v1/usage                   GET
/// /api/v1/summary                 GET
/// /api/v1/track                   POST
/// /api/v1/budgets                 PUT
/// /api/v1/budgets                 GET
/// /api/v1/budgets/{name}          GET
/// /api/v1/budgets/{name}/reset    POST
/// ```
///
/// Everything else falls through to the proxy handler.
pub fn build_api_router() -> Router<AppState> {
    let v1 = Router::new()
        .route("/usage", get(report::query_usage))
        .route("/summary", get(report::usage_summary))
        .route("/track", post(track::track_usage))
        .route("/budgets", put(budget::set_budget))
        .route("/budgets", get(budget::list_budgets))
        .route("/budgets/{name}", get(budget::get_budget))
        .route("/budgets/{name}/reset", post(budget::reset_budget));

    Router::new()
        .route("/healthz", get(health::health_check))
        .nest("/api/v1", v1)
}
