pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod proxy;
pub mod storage;
pub mod tokenizer;
pub mod tracker;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::alerts::{Notifier, SlackNotifier, WebhookNotifier};
use crate::config::Config;
use crate::db::Database;
use crate::providers::anthropic::Anthropic;
use crate::providers::openai::OpenAi;
use crate::providers::pricing::PricingCatalog;
use crate::providers::ProviderRegistry;
use crate::storage::SqliteStorage;
use crate::tracker::{BudgetManager, UsageTracker};

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProviderRegistry>,
    pub tracker: Arc<UsageTracker>,
    /// Client used for upstream forwarding.
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire up the full pipeline from a loaded config and an open database.
    pub fn build(config: Config, db: Database) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(build_registry(&config)?);
        let storage = Arc::new(SqliteStorage::new(db));
        let notifiers = build_notifiers(&config);
        let budgets = BudgetManager::new(storage.clone(), notifiers);
        let tracker = Arc::new(UsageTracker::new(registry.clone(), storage, budgets));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            config,
            registry,
            tracker,
            http,
        })
    }
}

/// Build the provider registry from built-in catalogs, overridden by any
/// per-provider TOML files in the configured pricing directory.
pub fn build_registry(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let mut openai_catalog = PricingCatalog::openai_defaults();
    let mut anthropic_catalog = PricingCatalog::anthropic_defaults();

    if let Some(ref dir) = config.pricing.dir {
        for (name, catalog) in [
            ("openai", &mut openai_catalog),
            ("anthropic", &mut anthropic_catalog),
        ] {
            let path = dir.join(format!("{name}.toml"));
            if path.exists() {
                *catalog = PricingCatalog::load(&path)?;
                tracing::info!(provider = name, path = %path.display(), "Pricing loaded");
            }
        }
    }

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(OpenAi::new(openai_catalog)))?;
    registry.register(Arc::new(Anthropic::new(anthropic_catalog)))?;
    Ok(registry)
}

fn build_notifiers(config: &Config) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.alerts.slack.enabled && !config.alerts.slack.webhook_url.is_empty() {
        notifiers.push(Arc::new(SlackNotifier::new(
            config.alerts.slack.webhook_url.clone(),
            config.alerts.slack.channel.clone(),
        )));
    }
    if config.alerts.webhook.enabled && !config.alerts.webhook.url.is_empty() {
        notifiers.push(Arc::new(WebhookNotifier::new(
            config.alerts.webhook.url.clone(),
            config.alerts.webhook.secret.clone(),
        )));
    }
    notifiers
}

/// Build the application router: reporting/admin API plus the catch-all
/// proxy handler, wrapped in the shared middleware stack.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();
    let trace = TraceLayer::new_for_http();

    api::build_api_router()
        .fallback(proxy::proxy_handler)
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
