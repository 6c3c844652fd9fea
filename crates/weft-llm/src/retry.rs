use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use futures::future::BoxFuture;
use tracing::warn;

use weft_core::config::RetryConfig;
use weft_core::error::Result;
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

/// An adapter that retries transient provider failures with exponential
/// backoff. Permanent failures (auth, validation, bad bodies) pass through.
pub struct RetryingAdapter {
    inner: Arc<dyn ProviderAdapter>,
    config: RetryConfig,
}

impl RetryingAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

pub(crate) fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let ms = config
        .initial_backoff_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ProviderAdapter for RetryingAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        self.inner.is_configured(credentials)
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.inner.list_models()
    }

    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> BigDecimal {
        self.inner.estimate_cost(model, input_tokens, output_tokens)
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let params = params.clone();
        let credentials = credentials.clone();

        Box::pin(async move {
            let max_retries = self.config.max_retries;
            let mut attempt = 0;
            loop {
                match self.inner.call(&params, &credentials).await {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_transient() && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.config);
                        warn!(
                            provider = %self.inner.id(),
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying provider call"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}
