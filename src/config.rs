use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Maximum buffered body size on either leg, in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Attach informational cost/usage headers to metered responses.
    #[serde(default = "default_true")]
    pub add_cost_headers: bool,
    /// Reject calls with 402 when any budget has reached its limit.
    #[serde(default)]
    pub deny_on_exceed: bool,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Project attributed to calls that carry no project header.
    #[serde(default = "default_project")]
    pub default_project: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
            add_cost_headers: true,
            deny_on_exceed: false,
            upstream_timeout_secs: default_upstream_timeout(),
            default_project: default_project(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingConfig {
    /// Directory of per-provider TOML pricing files overriding the built-in
    /// catalogs.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8787
}
fn default_db_path() -> PathBuf {
    PathBuf::from("tollgate.db")
}
fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}
fn default_upstream_timeout() -> u64 {
    120
}
fn default_project() -> String {
    "default".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `TOLLGATE_` takes precedence
    /// over the file value.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                }
            };
        }
        macro_rules! env_bool {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                }
            };
        }
        macro_rules! env_parse {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        env_str!("TOLLGATE_SERVER_HOST", self.server.host);
        env_parse!("TOLLGATE_SERVER_PORT", self.server.port);
        if let Ok(val) = std::env::var("TOLLGATE_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = std::env::var("TOLLGATE_DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
        }

        env_parse!("TOLLGATE_PROXY_MAX_BODY_SIZE", self.proxy.max_body_size);
        env_bool!("TOLLGATE_PROXY_COST_HEADERS", self.proxy.add_cost_headers);
        env_bool!("TOLLGATE_PROXY_DENY_ON_EXCEED", self.proxy.deny_on_exceed);
        env_parse!(
            "TOLLGATE_PROXY_UPSTREAM_TIMEOUT_SECS",
            self.proxy.upstream_timeout_secs
        );
        env_str!("TOLLGATE_PROXY_DEFAULT_PROJECT", self.proxy.default_project);

        if let Ok(val) = std::env::var("TOLLGATE_PRICING_DIR") {
            self.pricing.dir = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        env_bool!("TOLLGATE_SLACK_ENABLED", self.alerts.slack.enabled);
        env_str!("TOLLGATE_SLACK_WEBHOOK_URL", self.alerts.slack.webhook_url);
        env_str!("TOLLGATE_SLACK_CHANNEL", self.alerts.slack.channel);
        env_bool!("TOLLGATE_WEBHOOK_ENABLED", self.alerts.webhook.enabled);
        env_str!("TOLLGATE_WEBHOOK_URL", self.alerts.webhook.url);
        if let Ok(val) = std::env::var("TOLLGATE_WEBHOOK_SECRET") {
            self.alerts.webhook.secret = if val.is_empty() { None } else { Some(val) };
        }

        env_str!("TOLLGATE_LOG_LEVEL", self.logging.level);
        env_bool!("TOLLGATE_LOG_JSON", self.logging.json);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
