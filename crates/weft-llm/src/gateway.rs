use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use tracing::{debug, info, warn};

use weft_core::error::{Result, WeftError};
use weft_core::tokens::approx_token_count;
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

use crate::pricing::Capability;

/// Registry of provider adapters keyed by provider id.
///
/// Constructed explicitly and handed to the engine; there is no global
/// registry.
#[derive(Default, Clone)]
pub struct ModelGateway {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own id, replacing any previous one.
    pub fn register(&mut self, adapter: impl ProviderAdapter) {
        self.register_arc(Arc::new(adapter));
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.id().to_string();
        if self.adapters.insert(id.clone(), adapter).is_some() {
            warn!(provider = %id, "Replacing registered provider adapter");
        }
    }

    pub fn adapter(&self, provider: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider)
    }

    /// Run one completion through `provider`.
    ///
    /// Credentials are format-checked locally before any request is made.
    pub async fn call(
        &self,
        provider: &str,
        params: &CallParams,
        credentials: &Credentials,
    ) -> Result<CallResult> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| WeftError::UnknownProvider(provider.to_string()))?;

        if !adapter.is_configured(credentials) {
            return Err(WeftError::ProviderNotConfigured(provider.to_string()));
        }

        debug!(provider, model = %params.model, messages = params.messages.len(), "Calling provider");
        let result = adapter.call(params, credentials).await?;
        info!(
            provider,
            model = %result.model,
            input_tokens = result.usage.input,
            output_tokens = result.usage.output,
            latency_ms = result.latency_ms,
            cost = %result.cost,
            "Provider call completed"
        );
        Ok(result)
    }

    /// Price of a hypothetical call. Unknown providers and models cost 0.
    pub fn estimate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> BigDecimal {
        self.adapters
            .get(provider)
            .map(|a| a.estimate_cost(model, input_tokens, output_tokens))
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Approximate token count using the provider's heuristic, or the
    /// generic chars/4 estimate for unknown providers.
    pub fn count_tokens(&self, provider: &str, text: &str) -> usize {
        self.adapters
            .get(provider)
            .map(|a| a.count_tokens(text))
            .unwrap_or_else(|| approx_token_count(text))
    }

    pub fn recommended_model(&self, capability: &str) -> Option<ModelRef> {
        capability.parse::<Capability>().ok().map(|c| c.recommended())
    }

    /// Descriptors for every registered provider, sorted by id.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        let mut out: Vec<ProviderDescriptor> =
            self.adapters.values().map(|a| a.descriptor()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
