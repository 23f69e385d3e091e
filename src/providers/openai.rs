use std::collections::HashMap;

use crate::error::AppError;
use crate::providers::pricing::{ModelPricing, PricingCatalog};
use crate::providers::{Provider, TokenClass};

/// OpenAI model catalog and pricing.
pub struct OpenAi {
    catalog: PricingCatalog,
    by_model: HashMap<String, ModelPricing>,
}

impl OpenAi {
    pub fn new(catalog: PricingCatalog) -> Self {
        let by_model = catalog
            .models
            .iter()
            .map(|m| (m.model.clone(), m.clone()))
            .collect();
        Self { catalog, by_model }
    }
}

impl Provider for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    fn models(&self) -> &[ModelPricing] {
        &self.catalog.models
    }

    fn price_per_token(&self, model: &str, class: TokenClass) -> Result<f64, AppError> {
        let pricing = self
            .by_model
            .get(model)
            .ok_or_else(|| AppError::Pricing(format!("openai: unknown model {model:?}")))?;

        let per_million = match class {
            TokenClass::Input => pricing.input_per_million,
            TokenClass::Output => pricing.output_per_million,
            // OpenAI pricing here does not distinguish cached reads.
            TokenClass::CachedInput => pricing.input_per_million,
        };
        Ok(per_million / 1_000_000.0)
    }

    fn supports_model(&self, model: &str) -> bool {
        self.by_model.contains_key(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAi {
        OpenAi::new(PricingCatalog::openai_defaults())
    }

    #[test]
    fn test_price_per_token() {
        let p = provider();
        let input = p.price_per_token("gpt-4o", TokenClass::Input).unwrap();
        let output = p.price_per_token("gpt-4o", TokenClass::Output).unwrap();
        assert!((input - 2.50 / 1_000_000.0).abs() < f64::EPSILON);
        assert!((output - 10.00 / 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cached_input_falls_back_to_input() {
        let p = provider();
        let input = p.price_per_token("gpt-4o", TokenClass::Input).unwrap();
        let cached = p
            .price_per_token("gpt-4o", TokenClass::CachedInput)
            .unwrap();
        assert_eq!(input, cached);
    }

    #[test]
    fn test_unknown_model_names_the_model() {
        let p = provider();
        let err = p
            .price_per_token("gpt-99", TokenClass::Input)
            .unwrap_err()
            .to_string();
        assert!(err.contains("gpt-99"));
    }

    #[test]
    fn test_supports_model() {
        let p = provider();
        assert!(p.supports_model("gpt-4o"));
        assert!(!p.supports_model("claude-3-5-sonnet-20241022"));
    }
}
