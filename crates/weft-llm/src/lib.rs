pub mod gateway;
pub mod pricing;
pub mod providers;
pub mod retry;

use std::sync::Arc;

use weft_core::config::AppConfig;
use weft_core::traits::ProviderAdapter;

pub use gateway::ModelGateway;
pub use pricing::Capability;
pub use providers::{AnthropicAdapter, AzureAdapter, GeminiAdapter, OpenAiAdapter};
pub use retry::RetryingAdapter;

/// Build a gateway with every built-in adapter, applying `base_url`
/// overrides from `[providers.*]` and wrapping each in retry.
pub fn gateway_from_config(config: &AppConfig) -> ModelGateway {
    let providers = &config.providers;
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    let mut anthropic = AnthropicAdapter::new();
    if let Some(url) = providers.base_url("anthropic") {
        anthropic = anthropic.with_base_url(url);
    }
    adapters.push(Arc::new(anthropic));

    let mut gemini = GeminiAdapter::new();
    if let Some(url) = providers.base_url("gemini") {
        gemini = gemini.with_base_url(url);
    }
    adapters.push(Arc::new(gemini));

    let mut azure = AzureAdapter::new();
    if let Some(url) = providers.base_url("azure-openai") {
        azure = azure.with_base_url(url);
    }
    adapters.push(Arc::new(azure));

    for name in providers::presets::all_preset_names() {
        if let Some(preset) = providers::presets::get_preset(name) {
            let mut adapter = OpenAiAdapter::with_preset(preset);
            if let Some(url) = providers.base_url(name) {
                adapter = adapter.with_base_url(url);
            }
            adapters.push(Arc::new(adapter));
        }
    }

    let mut gateway = ModelGateway::new();
    for adapter in adapters {
        gateway.register_arc(Arc::new(RetryingAdapter::new(adapter, config.retry.clone())));
    }
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_from_default_config() {
        let gateway = gateway_from_config(&AppConfig::default());
        let ids: Vec<String> = gateway.providers().into_iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec!["anthropic", "azure-openai", "deepseek", "gemini", "groq", "mistral", "openai"]
        );
        // Wrapping keeps the inner adapter's identity and pricing.
        assert!(!gateway
            .adapter("openai")
            .unwrap()
            .list_models()
            .is_empty());
    }
}
