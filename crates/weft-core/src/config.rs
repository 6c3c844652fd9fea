use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};
use crate::traits::CredentialStore;
use crate::types::{Credentials, OwnerId};

/// Top-level Weft configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Safety cap on visited nodes per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Per-node timeout in seconds (0 = no timeout).
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Runs allowed to execute at the same time; further runs queue.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Reject graphs where a non-condition node has more than one outgoing edge.
    #[serde(default)]
    pub strict_edges: bool,
    /// Fail instead of completing when a condition node has no edge for its result.
    #[serde(default)]
    pub fail_on_missing_branch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            node_timeout_secs: default_node_timeout(),
            max_concurrent_runs: default_max_concurrent_runs(),
            strict_edges: false,
            fail_on_missing_branch: false,
        }
    }
}

fn default_max_steps() -> usize { 50 }
fn default_node_timeout() -> u64 { 120 }
fn default_max_concurrent_runs() -> usize { 16 }

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. Unset = in-memory store.
    #[serde(default)]
    pub path: Option<String>,
}

impl StoreConfig {
    /// Resolve the database path (expand ~).
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_home)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// HTTP endpoint that executes tool requests. Unset = simulated tool results.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_tool_timeout(),
            headers: HashMap::new(),
        }
    }
}

fn default_tool_timeout() -> u64 { 30 }

/// Credentials and endpoint overrides for one provider.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure OpenAI resource name.
    #[serde(default)]
    pub resource: Option<String>,
    /// Azure OpenAI deployment name.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("resource", &self.resource)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ProviderConfig {
    pub fn to_credentials(&self) -> Option<Credentials> {
        let key = self.api_key.as_deref()?;
        let mut creds = Credentials::new(key);
        if let Some(ref resource) = self.resource {
            creds = creds.with_meta("resource", resource);
        }
        if let Some(ref deployment) = self.deployment {
            creds = creds.with_meta("deployment", deployment);
        }
        if let Some(ref version) = self.api_version {
            creds = creds.with_meta("api_version", version);
        }
        Some(creds)
    }
}

/// Provider table keyed by provider id.
///
/// Also serves as a single-tenant `CredentialStore`: every owner gets the
/// same credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(pub HashMap<String, ProviderConfig>);

impl ProvidersConfig {
    pub fn get(&self, provider: &str) -> Option<&ProviderConfig> {
        self.0.get(provider)
    }

    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.get(provider).and_then(|p| p.base_url.as_deref())
    }
}

impl CredentialStore for ProvidersConfig {
    fn credentials(
        &self,
        _owner: &OwnerId,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<Credentials>>> {
        let creds = self.get(provider).and_then(ProviderConfig::to_credentials);
        Box::pin(async move { Ok(creds) })
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WeftError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| WeftError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(WeftError::Config("engine.max_steps must be at least 1".into()));
        }
        if self.engine.max_concurrent_runs == 0 {
            return Err(WeftError::Config(
                "engine.max_concurrent_runs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
