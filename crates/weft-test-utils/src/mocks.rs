use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::tokens::approx_token_count;
use weft_core::traits::{CredentialStore, EventSink, ProviderAdapter, ToolExecutor};
use weft_core::types::*;

pub const MOCK_MODEL: &str = "mock-model";

enum Reply {
    Text(String),
    Fail { message: String, transient: bool },
}

/// Scripted provider adapter. Replies are consumed in order; once the script
/// runs out every call echoes the default reply.
pub struct MockAdapter {
    id: String,
    script: Mutex<VecDeque<Reply>>,
    default_reply: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<CallParams>>,
}

impl MockAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            default_reply: "mock reply".into(),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_reply(mut self, text: impl Into<String>) -> Self {
        self.default_reply = text.into();
        self
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Reply::Text(text.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>, transient: bool) -> Self {
        self.push(Reply::Fail {
            message: message.into(),
            transient,
        });
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: Reply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `CallParams` this adapter received, in order.
    pub fn calls(&self) -> Vec<CallParams> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The last user message of each call.
    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|p| {
                p.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
            })
            .collect()
    }
}

impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Mock"
    }

    fn is_configured(&self, credentials: &Credentials) -> bool {
        !credentials.api_key().is_empty() && credentials.api_key() != "bad-key"
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: MOCK_MODEL.into(),
            display_name: "Mock Model".into(),
            context_window: 8192,
            pricing: ModelPricing::from_micros(3_000_000, 15_000_000),
        }]
    }

    fn call(
        &self,
        params: &CallParams,
        _credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>> {
        let params = params.clone();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(params.clone());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
            let text = match next {
                Some(Reply::Text(text)) => text,
                Some(Reply::Fail { message, transient }) => {
                    return Err(WeftError::ProviderCallFailed {
                        provider: self.id.clone(),
                        message,
                        transient,
                    });
                }
                None => self.default_reply.clone(),
            };

            let input: usize = params
                .messages
                .iter()
                .map(|m| approx_token_count(&m.content))
                .sum();
            let usage = TokenUsage::new(input as u64, approx_token_count(&text) as u64);
            let cost = self.estimate_cost(&params.model, usage.input, usage.output);

            Ok(CallResult {
                content: text,
                usage,
                cost,
                latency_ms: 1,
                finish_reason: FinishReason::Stop,
                provider: self.id.clone(),
                model: params.model.clone(),
            })
        })
    }
}

/// Tool executor returning canned responses per tool name.
#[derive(Default)]
pub struct MockToolExecutor {
    responses: HashMap<String, serde_json::Value>,
    failing: HashMap<String, String>,
    requests: Mutex<Vec<ToolRequest>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, tool: impl Into<String>, response: serde_json::Value) -> Self {
        self.responses.insert(tool.into(), response);
        self
    }

    pub fn with_failure(mut self, tool: impl Into<String>, message: impl Into<String>) -> Self {
        self.failing.insert(tool.into(), message.into());
        self
    }

    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ToolExecutor for MockToolExecutor {
    fn execute(&self, request: ToolRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if let Some(message) = self.failing.get(&request.tool_name) {
                return Err(WeftError::ToolExecutionFailed {
                    tool: request.tool_name.clone(),
                    message: message.clone(),
                });
            }
            Ok(self
                .responses
                .get(&request.tool_name)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"ok": true})))
        })
    }
}

/// Event sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<ExecutionStatus> {
        self.events().iter().map(|e| e.status).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ExecutionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Fixed per-provider credentials shared by every owner.
#[derive(Default)]
pub struct StaticCredentials {
    keys: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.keys.insert(provider.into(), Credentials::new(api_key));
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn credentials(
        &self,
        _owner: &OwnerId,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<Credentials>>> {
        let found = self.keys.get(provider).cloned();
        Box::pin(async move { Ok(found) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_adapter_script() {
        let adapter = MockAdapter::new("mock")
            .with_reply("first")
            .with_failure("HTTP 503", true);
        let params = CallParams::new(MOCK_MODEL, vec![ChatMessage::user("hello there")]);
        let creds = Credentials::new("key");

        assert_eq!(adapter.call(&params, &creds).await.unwrap().content, "first");
        assert!(adapter.call(&params, &creds).await.unwrap_err().is_transient());
        assert_eq!(adapter.call(&params, &creds).await.unwrap().content, "mock reply");
        assert_eq!(adapter.call_count(), 3);
        assert_eq!(adapter.prompts(), vec!["hello there"; 3]);
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let store = StaticCredentials::new().with("mock", "key");
        let owner = OwnerId::new("alice");
        assert!(store.credentials(&owner, "mock").await.unwrap().is_some());
        assert!(store.credentials(&owner, "other").await.unwrap().is_none());
    }
}
