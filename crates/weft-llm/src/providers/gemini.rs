use std::time::Instant;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use weft_core::error::{Result, WeftError};
use weft_core::traits::ProviderAdapter;
use weft_core::types::*;

use crate::pricing::{find_pricing, model_infos, ModelSpec};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_KEY_LEN: usize = 39;

const MODELS: &[ModelSpec] = &[
    ModelSpec::new("gemini-2.5-pro", "Gemini 2.5 Pro", 1_048_576, 1_250_000, 10_000_000),
    ModelSpec::new("gemini-2.0-flash", "Gemini 2.0 Flash", 1_048_576, 100_000, 400_000),
    ModelSpec::new("gemini-1.5-pro", "Gemini 1.5 Pro", 2_097_152, 1_250_000, 5_000_000),
    ModelSpec::new("gemini-1.5-flash", "Gemini 1.5 Flash", 1_048_576, 75_000, 300_000),
];

/// Google Gemini (Generative Language API) client.
pub struct GeminiAdapter {
    http: Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// Gemini API request types
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

// Gemini API response types
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn build_request(params: &CallParams) -> GeminiRequest {
    let (system, rest) = params.split_system();

    let contents = rest
        .into_iter()
        .map(|m| GeminiContent {
            role: Some(match m.role {
                Role::Assistant => "model",
                _ => "user",
            }),
            parts: vec![TextPart {
                text: m.content.clone(),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction: system.map(|text| GeminiContent {
            role: None,
            parts: vec![TextPart { text }],
        }),
        generation_config: GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
            top_p: params.top_p,
            stop_sequences: params.stop.clone(),
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        },
    }
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Stop,
    }
}

fn into_result(response: GeminiResponse, model: &str, latency_ms: u64) -> Result<CallResult> {
    let blocked = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_ref())
        .is_some();

    let (content, finish_reason) = match response.candidates.into_iter().next() {
        Some(candidate) => {
            let text = candidate
                .content
                .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
                .unwrap_or_default();
            (text, map_finish_reason(candidate.finish_reason.as_deref()))
        }
        // A blocked prompt is an answer; an empty candidate list otherwise is not.
        None if blocked => (String::new(), FinishReason::ContentFilter),
        None => {
            return Err(WeftError::provider_permanent("gemini", "no candidates in response"));
        }
    };

    let usage = response
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();
    let cost = find_pricing(MODELS, model)
        .map(|p| p.cost(usage.input, usage.output))
        .unwrap_or_else(|| bigdecimal::BigDecimal::from(0));

    Ok(CallResult {
        content,
        usage,
        cost,
        latency_ms,
        finish_reason,
        provider: "gemini".to_string(),
        model: model.to_string(),
    })
}

impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        "Google Gemini"
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        let key = credentials.api_key();
        key.starts_with("AIza")
            && key.len() == GEMINI_KEY_LEN
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        model_infos(MODELS)
    }

    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let body = build_request(params);
        let model = params.model.clone();
        let api_key = credentials.api_key().to_string();

        Box::pin(async move {
            let start = Instant::now();
            let req = self
                .http
                .post(self.endpoint(&model))
                .header("x-goog-api-key", api_key)
                .header("content-type", "application/json")
                .json(&body);

            let response: GeminiResponse = super::send_json("gemini", req).await?;
            let latency_ms = start.elapsed().as_millis() as u64;

            into_result(response, &model, latency_ms)
        })
    }
}
