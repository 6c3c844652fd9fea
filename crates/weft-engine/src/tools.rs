use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use weft_core::config::ToolsConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolRequest;

/// Runs tools by POSTing `{toolName, args}` to an HTTP endpoint and
/// returning the JSON response body.
pub struct HttpToolExecutor {
    http: Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl HttpToolExecutor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeftError::Config(format!("tool HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Build from `[tools]`. Returns `None` when no endpoint is configured.
    pub fn from_config(config: &ToolsConfig) -> Result<Option<Self>> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        let executor = Self::new(endpoint.clone(), Duration::from_secs(config.timeout_secs))?
            .with_headers(config.headers.clone());
        Ok(Some(executor))
    }
}

impl ToolExecutor for HttpToolExecutor {
    fn execute(&self, request: ToolRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let failed = |message: String| WeftError::ToolExecutionFailed {
                tool: request.tool_name.clone(),
                message,
            };

            let mut req = self.http.post(&self.endpoint).json(&request);
            for (name, value) in &self.headers {
                req = req.header(name, value);
            }

            debug!(tool = %request.tool_name, endpoint = %self.endpoint, "Calling tool endpoint");
            let response = req.send().await.map_err(|e| failed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(failed(format!("HTTP {}: {}", status, body)));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| failed(format!("invalid response body: {}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        assert!(HttpToolExecutor::from_config(&ToolsConfig::default())
            .unwrap()
            .is_none());

        let mut config = ToolsConfig::default();
        config.endpoint = Some("http://localhost:8088/tools/execute".into());
        config
            .headers
            .insert("Authorization".into(), "Bearer t".into());
        let executor = HttpToolExecutor::from_config(&config).unwrap().unwrap();
        assert_eq!(executor.endpoint, "http://localhost:8088/tools/execute");
        assert_eq!(executor.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_tool_failure() {
        let executor =
            HttpToolExecutor::new("http://127.0.0.1:9/tools", Duration::from_secs(2)).unwrap();
        let err = executor
            .execute(ToolRequest {
                tool_name: "search".into(),
                args: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ToolExecutionFailed { tool, .. } if tool == "search"));
    }
}
