//! Model pricing catalogs.
//!
//! Prices are in USD per 1M tokens. Built-in defaults are compiled in; a
//! pricing directory with per-provider TOML files can override them.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pricing for a single model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
    /// Cached-input price for providers that discount cache reads. A value
    /// of 0 (or omission) means the standard input price applies.
    #[serde(default)]
    pub cached_input_per_million: f64,
}

/// A provider's full pricing table, as loaded from a pricing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingCatalog {
    pub provider: String,
    #[serde(default)]
    pub updated: String,
    pub models: Vec<ModelPricing>,
}

impl PricingCatalog {
    /// Load a catalog from a TOML pricing file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read pricing file {}: {e}", path.display()))?;
        let catalog: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parse pricing file {}: {e}", path.display()))?;

        if catalog.provider.is_empty() {
            anyhow::bail!("pricing file {}: missing provider name", path.display());
        }
        if catalog.models.is_empty() {
            anyhow::bail!("pricing file {}: no models defined", path.display());
        }
        Ok(catalog)
    }

    /// Built-in OpenAI pricing.
    /// Source: https://openai.com/api/pricing
    pub fn openai_defaults() -> Self {
        Self {
            provider: "openai".to_string(),
            updated: "2025-06".to_string(),
            models: vec![
                ModelPricing {
                    model: "gpt-4o".to_string(),
                    input_per_million: 2.50,
                    output_per_million: 10.00,
                    cached_input_per_million: 1.25,
                },
                ModelPricing {
                    model: "gpt-4o-mini".to_string(),
                    input_per_million: 0.15,
                    output_per_million: 0.60,
                    cached_input_per_million: 0.075,
                },
                ModelPricing {
                    model: "gpt-4-turbo".to_string(),
                    input_per_million: 10.00,
                    output_per_million: 30.00,
                    cached_input_per_million: 0.0,
                },
                ModelPricing {
                    model: "o1".to_string(),
                    input_per_million: 15.00,
                    output_per_million: 60.00,
                    cached_input_per_million: 7.50,
                },
                ModelPricing {
                    model: "o3-mini".to_string(),
                    input_per_million: 1.10,
                    output_per_million: 4.40,
                    cached_input_per_million: 0.55,
                },
            ],
        }
    }

    /// Built-in Anthropic pricing.
    /// Source: https://www.anthropic.com/pricing
    pub fn anthropic_defaults() -> Self {
        Self {
            provider: "anthropic".to_string(),
            updated: "2025-06".to_string(),
            models: vec![
                ModelPricing {
                    model: "claude-3-5-sonnet-20241022".to_string(),
                    input_per_million: 3.00,
                    output_per_million: 15.00,
                    cached_input_per_million: 0.30,
                },
                ModelPricing {
                    model: "claude-sonnet-4-20250514".to_string(),
                    input_per_million: 3.00,
                    output_per_million: 15.00,
                    cached_input_per_million: 0.30,
                },
                ModelPricing {
                    model: "claude-opus-4-20250514".to_string(),
                    input_per_million: 15.00,
                    output_per_million: 75.00,
                    cached_input_per_million: 1.50,
                },
                ModelPricing {
                    model: "claude-3-5-haiku-20241022".to_string(),
                    input_per_million: 0.80,
                    output_per_million: 4.00,
                    cached_input_per_million: 0.08,
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
