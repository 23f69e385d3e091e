//! Usage tracking pipeline: cost calculation, persistence, budget spend.

pub mod budget;
pub mod cost;

pub use budget::BudgetManager;
pub use cost::CostCalculator;

use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::providers::ProviderRegistry;
use crate::storage::Storage;
use crate::types::{ReportFilter, UsageRecord, UsageSummary};

/// Facade over the tracking pipeline. One call prices a usage event,
/// persists it, and applies the spend to every budget.
pub struct UsageTracker {
    storage: Arc<dyn Storage>,
    calculator: CostCalculator,
    budgets: BudgetManager,
}

impl UsageTracker {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        storage: Arc<dyn Storage>,
        budgets: BudgetManager,
    ) -> Self {
        Self {
            storage,
            calculator: CostCalculator::new(registry),
            budgets,
        }
    }

    /// Price, persist, and apply spend for one usage event. Returns the
    /// stored record with its id, timestamp, and cost filled in.
    pub async fn track(
        &self,
        provider: &str,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
        project: &str,
    ) -> Result<UsageRecord, AppError> {
        let record = UsageRecord {
            id: String::new(),
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost_usd: 0.0,
            project: project.to_string(),
            timestamp: Utc::now(),
        };
        self.track_record(record).await
    }

    /// Like [`track`](Self::track) but starting from a caller-built record.
    /// Missing id and cost are filled in; the pricing lookup must succeed or
    /// the record is not persisted.
    pub async fn track_record(&self, mut record: UsageRecord) -> Result<UsageRecord, AppError> {
        record.cost_usd = self.calculator.calculate(
            &record.provider,
            &record.model,
            record.input_tokens,
            record.output_tokens,
        )?;

        self.storage.record_usage(&mut record)?;

        tracing::info!(
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.cost_usd,
            project = %record.project,
            "Usage recorded"
        );

        // Budget spend failing must not fail the tracked request; the usage
        // record is already durable.
        if let Err(e) = self.budgets.record_spend(record.cost_usd).await {
            tracing::error!(error = %e, "Budget spend application failed");
        }

        Ok(record)
    }

    /// Raw usage records matching a filter, newest first.
    pub fn query(&self, filter: &ReportFilter) -> Result<Vec<UsageRecord>, AppError> {
        self.storage.query_usage(filter)
    }

    /// Aggregated totals matching a filter.
    pub fn report(&self, filter: &ReportFilter) -> Result<UsageSummary, AppError> {
        self.storage.aggregate_usage(filter)
    }

    /// Errors if any configured budget has reached its limit.
    pub fn check_budget(&self) -> Result<(), AppError> {
        self.budgets.check_all()
    }

    pub fn budgets(&self) -> &BudgetManager {
        &self.budgets
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
