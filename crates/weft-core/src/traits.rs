use bigdecimal::BigDecimal;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::tokens::approx_token_count;
use crate::types::*;

/// Provider adapter: one vendor's chat-completion API behind the unified call shape.
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Registry key (e.g., "anthropic", "openai").
    fn id(&self) -> &str;

    /// Human-readable vendor name.
    fn display_name(&self) -> &str;

    /// Cheap local check of the credential format. Never touches the network.
    fn is_configured(&self, credentials: &Credentials) -> bool;

    /// Models this adapter knows prices for.
    fn list_models(&self) -> Vec<ModelInfo>;

    /// Run one chat completion.
    fn call(
        &self,
        params: &CallParams,
        credentials: &Credentials,
    ) -> BoxFuture<'_, Result<CallResult>>;

    /// Cost for a model from this adapter's price table (0 for unknown models).
    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> BigDecimal {
        self.list_models()
            .iter()
            .find(|m| m.id == model)
            .map(|m| m.pricing.cost(input_tokens, output_tokens))
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Approximate token count for `text`.
    fn count_tokens(&self, text: &str) -> usize {
        approx_token_count(text)
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.id().to_string(),
            display_name: self.display_name().to_string(),
            models: self.list_models(),
        }
    }
}

/// Execution store: persistence backend for execution records and conversations.
pub trait ExecutionStore: Send + Sync + 'static {
    /// Create or replace the record with this execution's id. A record that
    /// is already terminal is left untouched.
    fn save(&self, execution: &Execution) -> BoxFuture<'_, Result<()>>;

    /// Load an execution by id.
    fn load(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>>;

    /// List an owner's executions, newest first.
    fn list(
        &self,
        owner: &OwnerId,
        filter: &ExecutionFilter,
    ) -> BoxFuture<'_, Result<Vec<Execution>>>;

    /// Append a conversation record produced by a model-call node.
    fn append_message(&self, record: &MessageRecord) -> BoxFuture<'_, Result<()>>;

    /// Conversation records for an execution, oldest first.
    fn messages(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Vec<MessageRecord>>>;
}

/// Event sink: receives progress notifications for live observers.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: ExecutionEvent);
}

/// Tool executor: runs a named tool outside the engine.
pub trait ToolExecutor: Send + Sync + 'static {
    fn execute(&self, request: ToolRequest) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Credential store: per-owner, per-provider API credentials.
pub trait CredentialStore: Send + Sync + 'static {
    fn credentials(
        &self,
        owner: &OwnerId,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<Credentials>>>;
}
