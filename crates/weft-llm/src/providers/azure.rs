use std::time::Instant;

use bigdecimal::BigDecimal;
use futures::future::BoxFuture;
use reqwest::Client;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

use super::openai::{build_request, into_result, ChatResponse};
use super::presets::OPENAI;
use crate::pricing::{find_pricing, model_infos};

const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI client. Uses the same wire format as OpenAI but a
/// per-deployment endpoint and an `api-key` header instead of a Bearer token.
///
/// Resource and deployment come from credential metadata
/// (`resource`, `deployment`, optional `api_version`).
pub struct AzureAdapter {
    http: Client,
    base_url: Option<String>,
}

impl AzureAdapter {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: None,
        }
    }

    /// Replace `https://{resource}.openai.azure.com` with a fixed host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn endpoint(&self, credentials: &Credentials) -> Result<String> {
        let deployment = credentials
            .meta("deployment")
            .ok_or_else(|| WeftError::provider_permanent("azure-openai", "deployment is required"))?;
        let api_version = credentials.meta("api_version").unwrap_or(DEFAULT_API_VERSION);

        let host = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let resource = credentials.meta("resource").ok_or_else(|| {
                    WeftError::provider_permanent("azure-openai", "resource is required")
                })?;
                format!("https://{resource}.openai.azure.com")
            }
        };

        Ok(format!(
            "{host}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
        ))
    }
}

impl Default for AzureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for AzureAdapter {
    fn id(&self) -> &str {
        "azure-openai"
    }

    fn display_name(&self) -> &str {
        "Azure OpenAI"
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        let key = credentials.api_key();
        key.len() == 32 && key.chars().all(|c| c.is_ascii_hexdigit())
    }

    // Azure deployments serve OpenAI models at OpenAI list prices.
    fn list_models(&self) -> Vec<ModelInfo> {
        model_infos(OPENAI.models)
    }

    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let body = build_request(params, false);
        let model = params.model.clone();
        let api_key = credentials.api_key().to_string();
        let endpoint = self.endpoint(credentials);

        Box::pin(async move {
            let url = endpoint?;
            let start = Instant::now();
            let req = self
                .http
                .post(&url)
                .header("api-key", api_key)
                .header("content-type", "application/json")
                .json(&body);

            let response: ChatResponse = super::send_json("azure-openai", req).await?;
            let latency_ms = start.elapsed().as_millis() as u64;

            let pricing = find_pricing(OPENAI.models, &model);
            into_result(
                response,
                "azure-openai",
                &model,
                |i, o| pricing.map(|p| p.cost(i, o)).unwrap_or_else(|| BigDecimal::from(0)),
                latency_ms,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789ABCDEF";

    #[test]
    fn test_key_format() {
        let adapter = AzureAdapter::new();
        assert!(adapter.is_configured(&Credentials::new(KEY)));
        assert!(!adapter.is_configured(&Credentials::new("sk-not-an-azure-key")));
        assert!(!adapter.is_configured(&Credentials::new("z123456789abcdef0123456789abcdef")));
    }

    #[test]
    fn test_endpoint_from_metadata() {
        let creds = Credentials::new(KEY)
            .with_meta("resource", "contoso")
            .with_meta("deployment", "gpt-4o");
        let url = AzureAdapter::new().endpoint(&creds).unwrap();
        assert_eq!(
            url,
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let creds = Credentials::new(KEY)
            .with_meta("deployment", "mini")
            .with_meta("api_version", "2025-01-01-preview");
        let url = AzureAdapter::new()
            .with_base_url("http://127.0.0.1:8080/")
            .endpoint(&creds)
            .unwrap();
        assert_eq!(
            url,
            "http://127.0.0.1:8080/openai/deployments/mini/chat/completions?api-version=2025-01-01-preview"
        );
    }

    #[test]
    fn test_missing_deployment_is_permanent() {
        let err = AzureAdapter::new()
            .endpoint(&Credentials::new(KEY).with_meta("resource", "contoso"))
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("deployment"));
    }
}
