//! Core domain types shared across the tracker, storage, and API layers.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A single observed LLM API call with its computed cost.
///
/// Records are immutable once persisted. An empty `id` is assigned by the
/// storage layer at insert time; `timestamp` defaults to now when the record
/// is deserialized without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub id: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub project: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Rollover cadence for a budget window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for BudgetPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown budget period {other:?}")),
        }
    }
}

/// A named spending limit. `current_spend` is the running accumulator that
/// every tracked dollar is applied to; it only ever changes through the
/// storage layer's atomic increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub limit_usd: f64,
    pub period: BudgetPeriod,
    #[serde(default)]
    pub current_spend: f64,
    pub alert_threshold_pct: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Conjunction of optional equality predicates plus a half-open time range
/// `[start, end)`. Used for both raw queries and aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Aggregated usage statistics for a filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_cost_usd: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub record_count: i64,
    #[serde(default)]
    pub by_provider: HashMap<String, f64>,
    #[serde(default)]
    pub by_model: HashMap<String, f64>,
}

/// UTC `[start, end)` bounds of the current period.
///
/// Weekly periods start on Monday (ISO convention).
pub fn period_bounds(period: BudgetPeriod) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let today = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);

    match period {
        BudgetPeriod::Daily => (today, today + Duration::days(1)),
        BudgetPeriod::Weekly => {
            let weekday = now.weekday().num_days_from_monday() as i64;
            let start = today - Duration::days(weekday);
            (start, start + Duration::days(7))
        }
        BudgetPeriod::Monthly => {
            let start = Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(today);
            let (ny, nm) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            let end = Utc
                .with_ymd_and_hms(ny, nm, 1, 0, 0, 0)
                .single()
                .unwrap_or(start + Duration::days(31));
            (start, end)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
