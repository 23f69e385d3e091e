use std::collections::HashMap;

use crate::error::AppError;
use crate::providers::pricing::{ModelPricing, PricingCatalog};
use crate::providers::{Provider, TokenClass};

/// Anthropic model catalog and pricing.
pub struct Anthropic {
    catalog: PricingCatalog,
    by_model: HashMap<String, ModelPricing>,
}

impl Anthropic {
    pub fn new(catalog: PricingCatalog) -> Self {
        let by_model = catalog
            .models
            .iter()
            .map(|m| (m.model.clone(), m.clone()))
            .collect();
        Self { catalog, by_model }
    }
}

impl Provider for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> &[ModelPricing] {
        &self.catalog.models
    }

    fn price_per_token(&self, model: &str, class: TokenClass) -> Result<f64, AppError> {
        let pricing = self
            .by_model
            .get(model)
            .ok_or_else(|| AppError::Pricing(format!("anthropic: unknown model {model:?}")))?;

        let per_million = match class {
            TokenClass::Input => pricing.input_per_million,
            TokenClass::Output => pricing.output_per_million,
            TokenClass::CachedInput => {
                if pricing.cached_input_per_million > 0.0 {
                    pricing.cached_input_per_million
                } else {
                    pricing.input_per_million
                }
            }
        };
        Ok(per_million / 1_000_000.0)
    }

    fn supports_model(&self, model: &str) -> bool {
        self.by_model.contains_key(model)
    }
}
