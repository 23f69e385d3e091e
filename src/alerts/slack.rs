use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::alerts::{Alert, AlertLevel, Notifier};

/// Sends alerts to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook_url: String,
    channel: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            channel: channel.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn build_payload(&self, alert: &Alert) -> SlackPayload {
        let color = match alert.level {
            AlertLevel::Warning => "#ff9900",
            AlertLevel::Critical => "#ff0000",
            AlertLevel::Exceeded => "#cc0000",
        };
        let usage_pct = if alert.limit_usd > 0.0 {
            alert.current_spend / alert.limit_usd * 100.0
        } else {
            0.0
        };

        SlackPayload {
            channel: self.channel.clone(),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title: format!("Tollgate: budget {}", alert.level.as_str()),
                fields: vec![
                    SlackField::short("Budget", alert.budget_name.clone()),
                    SlackField::short("Period", alert.period.clone()),
                    SlackField::short("Current Spend", format!("${:.2}", alert.current_spend)),
                    SlackField::short("Limit", format!("${:.2}", alert.limit_usd)),
                    SlackField::short("Threshold", format!("{:.0}%", alert.threshold_pct)),
                    SlackField::short("Usage", format!("{usage_pct:.1}%")),
                ],
                footer: "tollgate".to_string(),
                ts: chrono::Utc::now().timestamp(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = self.build_payload(alert);
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("slack returned status {}", resp.status());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    fields: Vec<SlackField>,
    footer: String,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

impl SlackField {
    fn short(title: &str, value: String) -> Self {
        Self {
            title: title.to_string(),
            value,
            short: true,
        }
    }
}
