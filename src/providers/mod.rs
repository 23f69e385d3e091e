//! Provider abstraction and registry.
//!
//! Each LLM vendor implements [`Provider`]; shared logic never branches on
//! provider strings outside the detection boundary in `proxy::detect`.

pub mod anthropic;
pub mod openai;
pub mod pricing;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::AppError;
use crate::providers::pricing::ModelPricing;

/// Pricing dimension within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Input,
    Output,
    CachedInput,
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::CachedInput => "cached_input",
        };
        f.write_str(s)
    }
}

/// An LLM vendor with its own model catalog and pricing.
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    /// All known models with pricing.
    fn models(&self) -> &[ModelPricing];

    /// USD cost of a single token of the given class for the given model.
    fn price_per_token(&self, model: &str, class: TokenClass) -> Result<f64, AppError>;

    /// Whether this provider has pricing for the given model.
    fn supports_model(&self, model: &str) -> bool;
}

/// Immutable-after-build provider registry.
///
/// Providers are registered during startup, then the registry is frozen
/// behind an `Arc` and shared across requests without locking.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. Only callable during startup, before the registry is
    /// shared.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), AppError> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(AppError::Internal(format!(
                "provider {name:?} already registered"
            )));
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, AppError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Pricing(format!("provider {name:?} not found")))
    }

    /// All registered providers, in name order.
    pub fn all(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.values().cloned().collect()
    }

    /// Search all providers for one that supports the given model.
    pub fn find_provider_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, AppError> {
        self.providers
            .values()
            .find(|p| p.supports_model(model))
            .cloned()
            .ok_or_else(|| AppError::Pricing(format!("no provider found for model {model:?}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
