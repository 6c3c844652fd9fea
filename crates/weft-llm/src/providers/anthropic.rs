use std::time::Instant;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::error::Result;
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

use crate::pricing::{find_pricing, model_infos, ModelSpec};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

const MODELS: &[ModelSpec] = &[
    ModelSpec::new("claude-opus-4-20250514", "Claude Opus 4", 200_000, 15_000_000, 75_000_000),
    ModelSpec::new("claude-sonnet-4-20250514", "Claude Sonnet 4", 200_000, 3_000_000, 15_000_000),
    ModelSpec::new("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", 200_000, 3_000_000, 15_000_000),
    ModelSpec::new("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 200_000, 800_000, 4_000_000),
];

pub struct AnthropicAdapter {
    http: Client,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// Anthropic API request types
#[derive(Serialize, Debug)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Default)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn build_request(params: &CallParams) -> AnthropicRequest {
    let (system, rest) = params.split_system();

    let messages = rest
        .into_iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::Assistant => "assistant",
                _ => "user",
            },
            content: m.content.clone(),
        })
        .collect();

    if params.frequency_penalty.is_some() || params.presence_penalty.is_some() {
        debug!("Anthropic does not support frequency/presence penalties, ignoring");
    }

    AnthropicRequest {
        model: params.model.clone(),
        max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system,
        temperature: params.temperature,
        top_p: params.top_p,
        stop_sequences: params.stop.clone(),
    }
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("refusal") => FinishReason::ContentFilter,
        // end_turn, stop_sequence, tool_use
        _ => FinishReason::Stop,
    }
}

fn into_result(response: AnthropicResponse, model: &str, latency_ms: u64) -> CallResult {
    let content = response
        .content
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let usage = TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens);
    let cost = find_pricing(MODELS, model)
        .map(|p| p.cost(usage.input, usage.output))
        .unwrap_or_else(|| bigdecimal::BigDecimal::from(0));

    CallResult {
        content,
        usage,
        cost,
        latency_ms,
        finish_reason: map_stop_reason(response.stop_reason.as_deref()),
        provider: "anthropic".to_string(),
        model: model.to_string(),
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        let key = credentials.api_key();
        key.starts_with("sk-ant-") && key.len() >= 20
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        model_infos(MODELS)
    }

    fn count_tokens(&self, text: &str) -> usize {
        // Claude vocabularies run closer to 3.5 chars per token.
        (text.chars().count() * 2).div_ceil(7)
    }

    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let body = build_request(params);
        let api_key = credentials.api_key().to_string();

        Box::pin(async move {
            let start = Instant::now();
            let req = self
                .http
                .post(&self.base_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body);

            let response: AnthropicResponse = super::send_json("anthropic", req).await?;
            let latency_ms = start.elapsed().as_millis() as u64;

            Ok(into_result(response, &body.model, latency_ms))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_key_format() {
        let adapter = AnthropicAdapter::new();
        assert!(!adapter.is_configured(&Credentials::new("bad-key")));
        assert!(!adapter.is_configured(&Credentials::new("sk-ant-")));
        assert!(adapter.is_configured(&Credentials::new("sk-ant-REDACTED")));
    }

    #[test]
    fn test_request_splits_system_and_renames_stop() {
        let mut params = CallParams::new(
            "claude-sonnet-4-20250514",
            vec![
                ChatMessage::system("You summarize."),
                ChatMessage::user("Summarize ownership"),
            ],
        );
        params.stop = vec!["END".into()];
        params.temperature = Some(0.2);

        let req = build_request(&params);
        assert_eq!(req.system.as_deref(), Some("You summarize."));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stop_sequences"], serde_json::json!(["END"]));
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn test_response_mapping() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "text", "text": "Ownership "},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "moves values."}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 1000, "output_tokens": 1000}
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let result = into_result(response, "claude-sonnet-4-20250514", 12);

        assert_eq!(result.content, "Ownership moves values.");
        assert_eq!(result.finish_reason, FinishReason::Length);
        assert_eq!(result.usage.total, 2000);
        assert_eq!(result.cost, bigdecimal::BigDecimal::from_str("0.018").unwrap());
        assert_eq!(result.latency_ms, 12);
    }

    #[test]
    fn test_stop_reasons() {
        assert_eq!(map_stop_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(map_stop_reason(Some("stop_sequence")), FinishReason::Stop);
        assert_eq!(map_stop_reason(Some("refusal")), FinishReason::ContentFilter);
        assert_eq!(map_stop_reason(None), FinishReason::Stop);
    }

    #[test]
    fn test_count_tokens() {
        let adapter = AnthropicAdapter::new();
        assert_eq!(adapter.count_tokens(""), 0);
        assert_eq!(adapter.count_tokens("abcdefg"), 2);
    }
}
