//! Cost calculation over the provider registry.

use std::sync::Arc;

use crate::error::AppError;
use crate::providers::{Provider, ProviderRegistry, TokenClass};

/// Computes USD costs for token usage.
pub struct CostCalculator {
    registry: Arc<ProviderRegistry>,
}

impl CostCalculator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Cost of a call priced by the named provider.
    pub fn calculate(
        &self,
        provider: &str,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<f64, AppError> {
        let p = self.registry.get(provider)?;
        calculate_cost(p.as_ref(), model, input_tokens, output_tokens)
    }

    /// Cost including cached input tokens billed at the cached-read rate.
    pub fn calculate_with_cache(
        &self,
        provider: &str,
        model: &str,
        input_tokens: i64,
        cached_input_tokens: i64,
        output_tokens: i64,
    ) -> Result<f64, AppError> {
        let p = self.registry.get(provider)?;
        let input_price = p.price_per_token(model, TokenClass::Input)?;
        let cached_price = p.price_per_token(model, TokenClass::CachedInput)?;
        let output_price = p.price_per_token(model, TokenClass::Output)?;

        Ok(input_tokens as f64 * input_price
            + cached_input_tokens as f64 * cached_price
            + output_tokens as f64 * output_price)
    }
}

/// Cost of a call priced directly against a provider.
pub fn calculate_cost(
    provider: &dyn Provider,
    model: &str,
    input_tokens: i64,
    output_tokens: i64,
) -> Result<f64, AppError> {
    let input_price = provider.price_per_token(model, TokenClass::Input)?;
    let output_price = provider.price_per_token(model, TokenClass::Output)?;
    Ok(input_tokens as f64 * input_price + output_tokens as f64 * output_price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Property-based tests
// ---------------------------------------------------------------------------
