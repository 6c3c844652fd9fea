use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // Graph errors
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Ambiguous graph: node '{node}' has {count} outgoing edges")]
    AmbiguousGraph { node: String, count: usize },

    #[error("Graph has no start or model-call node to enter at")]
    NoEntryNode,

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    // Run errors
    #[error("Execution exceeded the step limit ({0})")]
    LoopLimitExceeded(usize),

    #[error("Condition node '{node}' has no edge for branch '{branch}'")]
    MissingBranch { node: String, branch: String },

    #[error("Node '{node}' timed out after {timeout_secs}s")]
    NodeTimeout { node: String, timeout_secs: u64 },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    // Provider errors
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider call failed: {provider}: {message}")]
    ProviderCallFailed {
        provider: String,
        message: String,
        /// Whether a retry has a reasonable chance of succeeding.
        transient: bool,
    },

    // Tool errors
    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    /// A provider failure that will not get better by retrying.
    pub fn provider_permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderCallFailed {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// A provider failure caused by a timeout, dropped connection, rate limit or 5xx.
    pub fn provider_transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderCallFailed {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderCallFailed { transient: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        let e = WeftError::provider_transient("openai", "HTTP 503");
        assert!(e.is_transient());
        assert_eq!(e.to_string(), "Provider call failed: openai: HTTP 503");

        let e = WeftError::provider_permanent("openai", "HTTP 401");
        assert!(!e.is_transient());
        assert!(!WeftError::NoEntryNode.is_transient());
    }

    #[test]
    fn test_loop_limit_message() {
        let e = WeftError::LoopLimitExceeded(50);
        assert_eq!(e.to_string(), "Execution exceeded the step limit (50)");
    }
}
