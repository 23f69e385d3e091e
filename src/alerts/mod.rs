//! Budget threshold alerting.

pub mod slack;
pub mod webhook;

pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Severity of a budget alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Spend crossed the configured warning threshold.
    Warning,
    /// Spend is at 95% or more of the limit.
    Critical,
    /// Spend reached or passed the limit.
    Exceeded,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Exceeded => "exceeded",
        }
    }
}

/// A budget threshold notification. Derived at the moment a crossing is
/// detected; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub budget_name: String,
    pub limit_usd: f64,
    pub current_spend: f64,
    pub threshold_pct: f64,
    pub period: String,
    pub message: String,
}

/// Delivers alerts to an external system. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier identifier, used in delivery-failure logs.
    fn name(&self) -> &str;

    /// Deliver one alert.
    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_level_serde() {
        let json = serde_json::to_string(&AlertLevel::Exceeded).unwrap();
        assert_eq!(json, "\"exceeded\"");
        let level: AlertLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(level, AlertLevel::Warning);
    }

    #[test]
    fn test_alert_serializes_all_fields() {
        let alert = Alert {
            level: AlertLevel::Critical,
            budget_name: "team".to_string(),
            limit_usd: 100.0,
            current_spend: 96.0,
            threshold_pct: 80.0,
            period: "monthly".to_string(),
            message: "Budget \"team\" at 96.0% ($96.00 / $100.00)".to_string(),
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["level"], "critical");
        assert_eq!(value["budget_name"], "team");
        assert_eq!(value["limit_usd"], 100.0);
    }
}
