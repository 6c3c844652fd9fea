pub mod anthropic;
pub mod azure;
pub mod gemini;
pub mod openai;
pub mod presets;

pub use anthropic::AnthropicAdapter;
pub use azure::AzureAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use weft_core::error::{Result, WeftError};

/// Send a JSON request and decode the JSON response, classifying failures.
///
/// Timeouts, connection errors, 408, 429 and 5xx are transient; everything
/// else (auth, validation, undecodable bodies) is permanent.
pub(crate) async fn send_json<T: DeserializeOwned>(provider: &str, req: RequestBuilder) -> Result<T> {
    let response = req.send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            WeftError::provider_transient(provider, e.to_string())
        } else {
            WeftError::provider_permanent(provider, e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        let message = format!("HTTP {}: {}", status, body);
        return Err(if is_transient_status(status) {
            WeftError::provider_transient(provider, message)
        } else {
            WeftError::provider_permanent(provider, message)
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| WeftError::provider_permanent(provider, format!("invalid response body: {}", e)))
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
