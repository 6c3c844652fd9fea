use std::collections::HashMap;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user or tenant an execution runs on behalf of.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A chat message sent to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Vendor-neutral parameters for a single chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallParams {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl CallParams {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: Vec::new(),
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    /// Split system messages out of the conversation, joining them with blank lines.
    ///
    /// Vendors that take the system prompt as a separate field use this.
    pub fn split_system(&self) -> (Option<String>, Vec<&ChatMessage>) {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let rest = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let system = if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        };
        (system, rest)
    }
}

/// Why a model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

/// Token counters reported by a vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Normalized result of a model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallResult {
    pub content: String,
    pub usage: TokenUsage,
    /// Cost in US dollars.
    pub cost: BigDecimal,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
    pub provider: String,
    pub model: String,
}

/// Per-model pricing, in micro-dollars per million tokens.
///
/// Integer units keep every price table entry exact; conversion to
/// `BigDecimal` happens only when a cost is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_micros_per_mtok: u64,
    pub output_micros_per_mtok: u64,
}

impl ModelPricing {
    pub const fn from_micros(input_micros_per_mtok: u64, output_micros_per_mtok: u64) -> Self {
        Self {
            input_micros_per_mtok,
            output_micros_per_mtok,
        }
    }

    /// Exact cost in dollars for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> BigDecimal {
        // micro-dollars per million tokens == pico-dollars per token
        let picos = (input_tokens as i128) * (self.input_micros_per_mtok as i128)
            + (output_tokens as i128) * (self.output_micros_per_mtok as i128);
        picodollars_to_usd(picos)
    }

    /// Dollars per million input tokens.
    pub fn input_per_mtok(&self) -> BigDecimal {
        BigDecimal::from(self.input_micros_per_mtok) / BigDecimal::from(1_000_000u64)
    }

    /// Dollars per million output tokens.
    pub fn output_per_mtok(&self) -> BigDecimal {
        BigDecimal::from(self.output_micros_per_mtok) / BigDecimal::from(1_000_000u64)
    }
}

fn picodollars_to_usd(picos: i128) -> BigDecimal {
    BigDecimal::new(BigInt::from(picos), 12)
}

/// A model offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub context_window: u32,
    pub pricing: ModelPricing,
}

/// Description of a registered provider and its models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub models: Vec<ModelInfo>,
}

/// A (provider, model) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

/// API credentials for one provider.
///
/// The secret never appears in `Debug` output and the type is not
/// serializable, so it cannot end up in a persisted record by accident.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: String,
    metadata: HashMap<String, String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach non-secret settings some vendors need (Azure resource, deployment).
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = crate::error::WeftError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::error::WeftError::Config(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// Token and cost totals across every model call in one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: BigDecimal,
    pub calls: u32,
}

impl UsageTotals {
    pub fn record(&mut self, result: &CallResult) {
        self.input_tokens += result.usage.input;
        self.output_tokens += result.usage.output;
        self.total_tokens += result.usage.total;
        self.cost += result.cost.clone();
        self.calls += 1;
    }
}

/// One run of a graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: ExecutionId,
    pub graph_id: String,
    pub owner: OwnerId,
    pub status: ExecutionStatus,
    pub current_node: Option<String>,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub results: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub usage: UsageTotals,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Execution {
    pub fn new(
        graph_id: impl Into<String>,
        owner: OwnerId,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            graph_id: graph_id.into(),
            owner,
            status: ExecutionStatus::Pending,
            current_node: None,
            variables,
            results: HashMap::new(),
            usage: UsageTotals::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move from pending to running. Returns false if the execution already left pending.
    pub fn mark_running(&mut self) -> bool {
        if self.status != ExecutionStatus::Pending {
            return false;
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Move into a terminal state. Terminal states are final: returns false
    /// and leaves the record untouched if the execution already finished.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }
}

/// Query filter for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub graph_id: Option<String>,
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &Execution) -> bool {
        self.status.map_or(true, |s| execution.status == s)
            && self
                .graph_id
                .as_deref()
                .map_or(true, |g| execution.graph_id == g)
    }
}

/// A conversation record for a model-call node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub execution_id: ExecutionId,
    pub node_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(
        execution_id: &ExecutionId,
        node_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.clone(),
            node_id: node_id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Request sent to the external tool executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Progress notification for live observers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub node_id: Option<String>,
    pub status: ExecutionStatus,
    pub results: HashMap<String, serde_json::Value>,
}

impl ExecutionEvent {
    pub fn snapshot(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id.clone(),
            node_id: execution.current_node.clone(),
            status: execution.status,
            results: execution.results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sonnet_pricing() -> ModelPricing {
        ModelPricing::from_micros(3_000_000, 15_000_000)
    }

    #[test]
    fn test_cost_is_exact() {
        let cost = sonnet_pricing().cost(1000, 1000);
        assert_eq!(cost, BigDecimal::from_str("0.018").unwrap());
    }

    #[test]
    fn test_cost_accumulates_without_drift() {
        let mut total = BigDecimal::from(0);
        for _ in 0..1000 {
            total += sonnet_pricing().cost(1000, 1000);
        }
        assert_eq!(total, BigDecimal::from(18));
    }

    #[test]
    fn test_sub_micro_prices() {
        // $0.15 per million input tokens; one token is 0.00000015
        let pricing = ModelPricing::from_micros(150_000, 600_000);
        assert_eq!(
            pricing.cost(1, 0),
            BigDecimal::from_str("0.00000015").unwrap()
        );
        assert_eq!(pricing.input_per_mtok(), BigDecimal::from_str("0.15").unwrap());
        assert_eq!(pricing.output_per_mtok(), BigDecimal::from_str("0.6").unwrap());
    }

    #[test]
    fn test_cost_beyond_i64_range() {
        // u64::MAX tokens at $1 per million: 1.8e25 picodollars
        let pricing = ModelPricing::from_micros(1_000_000, 0);
        assert_eq!(
            pricing.cost(u64::MAX, 0),
            BigDecimal::from_str("18446744073709.551615").unwrap()
        );
    }

    #[test]
    fn test_split_system() {
        let params = CallParams::new(
            "m",
            vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
                ChatMessage::system("be kind"),
            ],
        );
        let (system, rest) = params.split_system();
        assert_eq!(system.as_deref(), Some("be brief\n\nbe kind"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content, "hi");
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = Credentials::new("sk-ant-secret").with_meta("region", "eu");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("redacted"));
        assert_eq!(creds.meta("region"), Some("eu"));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut exec = Execution::new("g", OwnerId::new("u"), serde_json::Map::new());
        assert!(exec.mark_running());
        assert!(!exec.mark_running());
        assert!(exec.finish(ExecutionStatus::Completed, None));
        assert!(!exec.finish(ExecutionStatus::Failed, Some("late".into())));
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.error.is_none());
        assert!(exec.completed_at.is_some());
    }

    #[test]
    fn test_filter_matches() {
        let mut exec = Execution::new("g1", OwnerId::new("u"), serde_json::Map::new());
        exec.mark_running();

        let by_status = ExecutionFilter {
            status: Some(ExecutionStatus::Running),
            ..Default::default()
        };
        assert!(by_status.matches(&exec));

        let by_graph = ExecutionFilter {
            graph_id: Some("g2".into()),
            ..Default::default()
        };
        assert!(!by_graph.matches(&exec));
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(ExecutionStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(ExecutionStatus::from_str("paused").is_err());
    }
}
