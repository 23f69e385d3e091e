//! Persistence contract for usage records and budgets.
//!
//! All shared mutable state (the usage ledger and budget accumulators) lives
//! behind this trait; nothing above it caches budget state across requests.

pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::AppError;
use crate::types::{Budget, ReportFilter, UsageRecord, UsageSummary};

/// Durable backend for usage records and budgets.
pub trait Storage: Send + Sync {
    /// Append one usage record. Assigns an id and timestamp if the record
    /// has none. A duplicate id is a constraint error, never an overwrite.
    fn record_usage(&self, record: &mut UsageRecord) -> Result<(), AppError>;

    /// Records matching the filter, newest first.
    fn query_usage(&self, filter: &ReportFilter) -> Result<Vec<UsageRecord>, AppError>;

    /// Single-pass aggregation over the filtered records, grouped
    /// additionally by provider and by model.
    fn aggregate_usage(&self, filter: &ReportFilter) -> Result<UsageSummary, AppError>;

    /// Create or update a budget by name. Updates never touch
    /// `current_spend`.
    fn set_budget(&self, budget: &mut Budget) -> Result<(), AppError>;

    /// Fetch a budget by name.
    fn get_budget(&self, name: &str) -> Result<Budget, AppError>;

    /// All budgets, in name order.
    fn list_budgets(&self) -> Result<Vec<Budget>, AppError>;

    /// Atomically add `delta` to a budget's `current_spend`. The increment
    /// is a single UPDATE expression evaluated by the storage engine, so
    /// concurrent deltas never lose updates.
    fn update_budget_spend(&self, name: &str, delta: f64) -> Result<(), AppError>;
}
