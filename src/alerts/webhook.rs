use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::alerts::{Alert, Notifier};

type HmacSha256 = Hmac<Sha256>;

/// Sends alerts to a generic HTTP webhook.
///
/// When a secret is configured, the request body is signed with HMAC-SHA256
/// and the signature is carried in `X-Signature-256`.
pub struct WebhookNotifier {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = WebhookPayload {
            event: "budget_alert",
            timestamp: chrono::Utc::now().to_rfc3339(),
            alert,
        };
        let body = serde_json::to_vec(&payload)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("tollgate/", env!("CARGO_PKG_VERSION")));

        if let Some(ref secret) = self.secret {
            let sig = compute_hmac(&body, secret.as_bytes());
            request = request.header("X-Signature-256", format!("sha256={sig}"));
        }

        let resp = request.body(body).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("webhook returned status {}", resp.status());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    timestamp: String,
    alert: &'a Alert,
}

fn compute_hmac(message: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}
