use std::time::Instant;

use bigdecimal::BigDecimal;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use weft_core::error::{Result, WeftError};
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

use super::presets::{ProviderPreset, OPENAI};
use crate::pricing::{find_pricing, model_infos};

/// OpenAI-compatible client. Works with OpenAI and every preset in
/// [`super::presets`] (Groq, Mistral, DeepSeek).
pub struct OpenAiAdapter {
    http: Client,
    preset: &'static ProviderPreset,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::with_preset(&OPENAI)
    }

    pub fn with_preset(preset: &'static ProviderPreset) -> Self {
        Self {
            http: Client::new(),
            preset,
            base_url: preset.default_base_url.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize, Debug)]
pub(crate) struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Build the chat-completions body. Azure addresses the model through the
/// deployment URL, so it passes `include_model = false`.
pub(crate) fn build_request(params: &CallParams, include_model: bool) -> ChatRequest {
    let messages = params
        .messages
        .iter()
        .map(|m| OaiMessage {
            role: m.role.as_str(),
            content: m.content.clone(),
        })
        .collect();

    // o-series models reject temperature, penalties and max_tokens
    let is_o_series = params.model.starts_with("o1")
        || params.model.starts_with("o3")
        || params.model.starts_with("o4");

    ChatRequest {
        model: include_model.then(|| params.model.clone()),
        messages,
        max_tokens: if is_o_series { None } else { params.max_tokens },
        max_completion_tokens: if is_o_series { params.max_tokens } else { None },
        temperature: if is_o_series { None } else { params.temperature },
        top_p: params.top_p,
        stop: if params.stop.is_empty() {
            None
        } else {
            Some(params.stop.clone())
        },
        frequency_penalty: if is_o_series { None } else { params.frequency_penalty },
        presence_penalty: if is_o_series { None } else { params.presence_penalty },
    }
}

pub(crate) fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        // stop, tool_calls, function_call
        _ => FinishReason::Stop,
    }
}

pub(crate) fn into_result(
    response: ChatResponse,
    provider: &str,
    model: &str,
    cost_of: impl Fn(u64, u64) -> BigDecimal,
    latency_ms: u64,
) -> Result<CallResult> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| WeftError::provider_permanent(provider, "no choices in response"))?;
    let content = choice.message.content.unwrap_or_default();
    let finish_reason = map_finish_reason(choice.finish_reason.as_deref());

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CallResult {
        content,
        usage,
        cost: cost_of(usage.input, usage.output),
        latency_ms,
        finish_reason,
        provider: provider.to_string(),
        model: model.to_string(),
    })
}

impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        self.preset.id
    }

    fn display_name(&self) -> &str {
        self.preset.display_name
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        self.preset.key_looks_valid(credentials.api_key())
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        model_infos(self.preset.models)
    }

    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let body = build_request(params, true);
        let model = params.model.clone();
        let api_key = credentials.api_key().to_string();

        Box::pin(async move {
            let start = Instant::now();
            let req = self
                .http
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body);

            let response: ChatResponse = super::send_json(self.preset.id, req).await?;
            let latency_ms = start.elapsed().as_millis() as u64;

            let pricing = find_pricing(self.preset.models, &model);
            into_result(
                response,
                self.preset.id,
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
    use crate::providers::presets::GROQ;
    use std::str::FromStr;

    fn params(model: &str) -> CallParams {
        let mut p = CallParams::new(
            model,
            vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
        );
        p.temperature = Some(0.7);
        p.frequency_penalty = Some(0.5);
        p.stop = vec!["\n\n".into()];
        p
    }

    #[test]
    fn test_request_keeps_system_inline() {
        let req = build_request(&params("gpt-4o"), true);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["stop"], serde_json::json!(["\n\n"]));
        assert_eq!(json["frequency_penalty"], 0.5);
        assert!(json.get("presence_penalty").is_none());
    }

    #[test]
    fn test_o_series_drops_sampling_params() {
        let json = serde_json::to_value(build_request(&params("o3-mini"), true)).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("frequency_penalty").is_none());
    }

    #[test]
    fn test_o_series_uses_max_completion_tokens() {
        let mut p = params("o1-mini");
        p.max_tokens = Some(512);
        let json = serde_json::to_value(build_request(&p, true)).unwrap();
        assert_eq!(json["max_completion_tokens"], 512);
        assert!(json.get("max_tokens").is_none());

        p.model = "gpt-4o".into();
        let json = serde_json::to_value(build_request(&p, true)).unwrap();
        assert_eq!(json["max_tokens"], 512);
        assert!(json.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_request_without_model() {
        let json = serde_json::to_value(build_request(&params("gpt-4o"), false)).unwrap();
        assert!(json.get("model").is_none());
    }

    #[test]
    fn test_response_mapping() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi!"},
                "finish_reason": "content_filter"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let pricing = find_pricing(OPENAI.models, "gpt-4o-mini").unwrap();
        let result =
            into_result(response, "openai", "gpt-4o-mini", |i, o| pricing.cost(i, o), 5).unwrap();

        assert_eq!(result.content, "Hi!");
        assert_eq!(result.finish_reason, FinishReason::ContentFilter);
        assert_eq!(result.usage, TokenUsage::new(10, 2));
        // 10 * 0.15/M + 2 * 0.60/M
        assert_eq!(result.cost, BigDecimal::from_str("0.0000027").unwrap());
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        let err = into_result(response, "openai", "gpt-4o", |_, _| BigDecimal::from(0), 0).unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Provider call failed: openai: no choices in response");
    }

    #[test]
    fn test_preset_identity() {
        let adapter = OpenAiAdapter::with_preset(&GROQ);
        assert_eq!(adapter.id(), "groq");
        assert!(adapter.is_configured(&Credentials::new("gsk_0123456789abcdefghij")));
        assert!(!adapter.is_configured(&Credentials::new("sk-0123456789abcdefghij")));
        assert!(adapter.list_models().iter().any(|m| m.id == "llama-3.1-8b-instant"));
    }

    #[test]
    fn test_finish_reasons() {
        assert_eq!(map_finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("tool_calls")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("length")), FinishReason::Length);
    }
}
