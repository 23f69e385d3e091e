//! Budget spend application, threshold classification, and alert fan-out.

use std::sync::Arc;

use crate::alerts::{Alert, AlertLevel, Notifier};
use crate::error::AppError;
use crate::storage::Storage;
use crate::types::Budget;

/// Applies spend to budgets and dispatches threshold alerts.
///
/// Budgets are global: every tracked dollar applies to every configured
/// budget. The storage increment is atomic, but classification re-reads the
/// incremented value, so two requests crossing a threshold in the same race
/// window may both alert. That duplication is accepted; there is no dedup
/// window.
pub struct BudgetManager {
    storage: Arc<dyn Storage>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl BudgetManager {
    pub fn new(storage: Arc<dyn Storage>, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { storage, notifiers }
    }

    /// Add `amount` to every configured budget and alert on any threshold
    /// crossing. A failure on one budget is logged and does not stop the
    /// others.
    pub async fn record_spend(&self, amount: f64) -> Result<(), AppError> {
        let budgets = self.storage.list_budgets()?;

        for budget in budgets {
            if let Err(e) = self.storage.update_budget_spend(&budget.name, amount) {
                tracing::error!(budget = %budget.name, error = %e, "Budget spend update failed");
                continue;
            }

            // Re-read to classify against the post-increment value.
            let updated = match self.storage.get_budget(&budget.name) {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(budget = %budget.name, error = %e, "Budget re-read failed");
                    continue;
                }
            };

            self.check_thresholds(&updated).await;
        }

        Ok(())
    }

    /// Synchronous pre-flight check: errors on the first budget (in name
    /// order) whose spend has reached its limit.
    pub fn check_all(&self) -> Result<(), AppError> {
        for budget in self.storage.list_budgets()? {
            if budget.current_spend >= budget.limit_usd {
                return Err(AppError::BudgetExceeded(format!(
                    "budget {:?} exceeded: ${:.2} / ${:.2}",
                    budget.name, budget.current_spend, budget.limit_usd
                )));
            }
        }
        Ok(())
    }

    /// Reset a budget's spend to zero by applying a negative delta through
    /// the same atomic increment path as normal spend.
    pub async fn reset(&self, name: &str) -> Result<(), AppError> {
        let budget = self.storage.get_budget(name)?;
        self.storage.update_budget_spend(name, -budget.current_spend)?;
        tracing::info!(budget = %name, "Budget spend reset");
        Ok(())
    }

    async fn check_thresholds(&self, budget: &Budget) {
        let Some(level) = classify(
            budget.current_spend,
            budget.limit_usd,
            budget.alert_threshold_pct,
        ) else {
            return;
        };

        let pct = budget.current_spend / budget.limit_usd * 100.0;
        let alert = Alert {
            level,
            budget_name: budget.name.clone(),
            limit_usd: budget.limit_usd,
            current_spend: budget.current_spend,
            threshold_pct: budget.alert_threshold_pct,
            period: budget.period.to_string(),
            message: format!(
                "Budget {:?} at {:.1}% (${:.2} / ${:.2})",
                budget.name, pct, budget.current_spend, budget.limit_usd
            ),
        };

        tracing::warn!(
            budget = %budget.name,
            level = level.as_str(),
            pct = pct,
            spend = budget.current_spend,
            limit = budget.limit_usd,
            "Budget threshold crossed"
        );

        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(&alert).await {
                tracing::error!(
                    notifier = notifier.name(),
                    budget = %budget.name,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }
    }
}

/// Classify a post-increment spend against a limit. Highest severity first;
/// budgets with a non-positive limit never classify.
fn classify(current_spend: f64, limit_usd: f64, threshold_pct: f64) -> Option<AlertLevel> {
    if limit_usd <= 0.0 {
        return None;
    }
    let pct = current_spend / limit_usd * 100.0;
    if pct >= 100.0 {
        Some(AlertLevel::Exceeded)
    } else if pct >= 95.0 {
        Some(AlertLevel::Critical)
    } else if pct >= threshold_pct {
        Some(AlertLevel::Warning)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::storage::SqliteStorage;
    use crate::types::BudgetPeriod;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Notifier that records every alert it is handed.
    struct RecordingNotifier {
        alerts: Mutex<Vec<Alert>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                alerts: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn received(&self) -> Vec<Alert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                anyhow::bail!("delivery refused");
            }
            Ok(())
        }
    }

    fn test_storage() -> Arc<SqliteStorage> {
        Arc::new(SqliteStorage::new(Database::open_in_memory().unwrap()))
    }

    fn seed_budget(storage: &SqliteStorage, name: &str, limit: f64, threshold: f64) {
        let mut budget = Budget {
            id: String::new(),
            name: name.to_string(),
            limit_usd: limit,
            period: BudgetPeriod::Monthly,
            current_spend: 0.0,
            alert_threshold_pct: threshold,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        storage.set_budget(&mut budget).unwrap();
    }

    #[test]
    fn test_classify_boundaries() {
        // Exactly 100% is EXCEEDED, exactly 95% is CRITICAL (never WARNING).
        assert_eq!(classify(100.0, 100.0, 80.0), Some(AlertLevel::Exceeded));
        assert_eq!(classify(101.0, 100.0, 80.0), Some(AlertLevel::Exceeded));
        assert_eq!(classify(95.0, 100.0, 80.0), Some(AlertLevel::Critical));
        assert_eq!(classify(99.9, 100.0, 80.0), Some(AlertLevel::Critical));
        assert_eq!(classify(80.0, 100.0, 80.0), Some(AlertLevel::Warning));
        assert_eq!(classify(94.9, 100.0, 80.0), Some(AlertLevel::Warning));
        assert_eq!(classify(79.9, 100.0, 80.0), None);
    }

    #[test]
    fn test_classify_skips_non_positive_limits() {
        assert_eq!(classify(1_000_000.0, 0.0, 80.0), None);
        assert_eq!(classify(1_000_000.0, -5.0, 80.0), None);
    }

    #[tokio::test]
    async fn test_record_spend_applies_to_all_budgets() {
        let storage = test_storage();
        seed_budget(&storage, "alpha", 100.0, 80.0);
        seed_budget(&storage, "beta", 50.0, 80.0);

        let manager = BudgetManager::new(storage.clone(), Vec::new());
        manager.record_spend(10.0).await.unwrap();

        assert!((storage.get_budget("alpha").unwrap().current_spend - 10.0).abs() < 1e-9);
        assert!((storage.get_budget("beta").unwrap().current_spend - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_warning_then_exceeded_alerts() {
        let storage = test_storage();
        seed_budget(&storage, "team", 100.0, 80.0);
        let notifier = RecordingNotifier::new(false);
        let manager = BudgetManager::new(storage.clone(), vec![notifier.clone()]);

        manager.record_spend(85.0).await.unwrap();
        let alerts = notifier.received();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert_eq!(alerts[0].budget_name, "team");

        manager.record_spend(16.0).await.unwrap();
        let alerts = notifier.received();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].level, AlertLevel::Exceeded);
        assert!((alerts[1].current_spend - 101.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_alert_delivered_to_every_notifier() {
        let storage = test_storage();
        seed_budget(&storage, "team", 100.0, 80.0);
        let first = RecordingNotifier::new(true); // fails after recording
        let second = RecordingNotifier::new(false);
        let manager =
            BudgetManager::new(storage.clone(), vec![first.clone(), second.clone()]);

        // One notifier failing must not block the other, nor the spend.
        manager.record_spend(85.0).await.unwrap();
        assert_eq!(first.received().len(), 1);
        assert_eq!(second.received().len(), 1);
        assert!((storage.get_budget("team").unwrap().current_spend - 85.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_alert_below_threshold() {
        let storage = test_storage();
        seed_budget(&storage, "team", 100.0, 80.0);
        let notifier = RecordingNotifier::new(false);
        let manager = BudgetManager::new(storage.clone(), vec![notifier.clone()]);

        manager.record_spend(50.0).await.unwrap();
        assert!(notifier.received().is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_never_alerts() {
        let storage = test_storage();
        seed_budget(&storage, "unlimited", 0.0, 80.0);
        let notifier = RecordingNotifier::new(false);
        let manager = BudgetManager::new(storage.clone(), vec![notifier.clone()]);

        manager.record_spend(9999.0).await.unwrap();
        assert!(notifier.received().is_empty());
    }

    #[test]
    fn test_check_all_names_first_exceeded_budget() {
        let storage = test_storage();
        seed_budget(&storage, "alpha", 10.0, 80.0);
        seed_budget(&storage, "beta", 10.0, 80.0);
        storage.update_budget_spend("beta", 10.0).unwrap();

        let manager = BudgetManager::new(storage.clone(), Vec::new());
        let err = manager.check_all().unwrap_err().to_string();
        assert!(err.contains("beta"));

        storage.update_budget_spend("alpha", 15.0).unwrap();
        // Name order is stable: alpha now reported first.
        let err = manager.check_all().unwrap_err().to_string();
        assert!(err.contains("alpha"));
    }

    #[test]
    fn test_check_all_ok_under_limits() {
        let storage = test_storage();
        seed_budget(&storage, "team", 100.0, 80.0);
        storage.update_budget_spend("team", 99.0).unwrap();
        let manager = BudgetManager::new(storage, Vec::new());
        assert!(manager.check_all().is_ok());
    }

    #[tokio::test]
    async fn test_reset_applies_negative_delta() {
        let storage = test_storage();
        seed_budget(&storage, "team", 100.0, 80.0);
        storage.update_budget_spend("team", 42.5).unwrap();

        let manager = BudgetManager::new(storage.clone(), Vec::new());
        manager.reset("team").await.unwrap();
        assert!(storage.get_budget("team").unwrap().current_spend.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_record_spend_sums_exactly() {
        let storage = test_storage();
        seed_budget(&storage, "load", 0.0, 80.0);
        let manager = Arc::new(BudgetManager::new(storage.clone(), Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.record_spend(0.5).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let budget = storage.get_budget("load").unwrap();
        assert!((budget.current_spend - 16.0).abs() < 1e-6);
    }
}
