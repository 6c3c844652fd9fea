use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use weft_core::error::{Result, WeftError};
use weft_core::traits::{CredentialStore, ExecutionStore, ToolExecutor};
use weft_core::types::*;
use weft_llm::ModelGateway;

use crate::graph::{CompiledNode, ModelCallConfig, NodeKind, ToolArg, ToolConfig};
use crate::template::Template;

/// What a node produced.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// Stored as `results[node.id]`.
    pub output: Value,
    /// Set by model-call nodes so the engine can add to the usage totals.
    pub call: Option<CallResult>,
}

impl NodeOutcome {
    fn value(output: Value) -> Self {
        Self { output, call: None }
    }
}

/// Runs individual nodes. Holds the collaborators that model-call and tool
/// nodes need; every other kind is a pure function of the execution state.
#[derive(Clone)]
pub struct NodeExecutors {
    gateway: Arc<ModelGateway>,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn ExecutionStore>,
    tools: Option<Arc<dyn ToolExecutor>>,
}

impl NodeExecutors {
    pub fn new(
        gateway: Arc<ModelGateway>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            gateway,
            credentials,
            store,
            tools: None,
        }
    }

    pub fn set_tool_executor(&mut self, tools: Arc<dyn ToolExecutor>) {
        self.tools = Some(tools);
    }

    pub async fn execute(&self, node: &CompiledNode, execution: &Execution) -> Result<NodeOutcome> {
        match &node.kind {
            NodeKind::Start => Ok(NodeOutcome::value(Value::Object(execution.variables.clone()))),
            NodeKind::ModelCall(config) => self.model_call(&node.id, config, execution).await,
            NodeKind::Condition(expr) => {
                let resolved = render(expr, execution);
                Ok(NodeOutcome::value(Value::Bool(resolved == "true")))
            }
            NodeKind::Transform(expr) => Ok(NodeOutcome::value(Value::String(render(expr, execution)))),
            NodeKind::Tool(config) => self.tool(config, execution).await.map(NodeOutcome::value),
            NodeKind::End => Ok(NodeOutcome::value(serde_json::json!({
                "completed": true,
                "timestamp": Utc::now().to_rfc3339(),
            }))),
        }
    }

    async fn model_call(
        &self,
        node_id: &str,
        config: &ModelCallConfig,
        execution: &Execution,
    ) -> Result<NodeOutcome> {
        let credentials = self
            .credentials
            .credentials(&execution.owner, &config.provider)
            .await?
            .ok_or_else(|| WeftError::ProviderNotConfigured(config.provider.clone()))?;

        let prompt = render(&config.prompt, execution);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &config.system_prompt {
            messages.push(ChatMessage::system(render(system, execution)));
        }
        messages.push(ChatMessage::user(prompt.clone()));

        let params = CallParams {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stop: config.stop.clone(),
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        };

        self.store
            .append_message(&MessageRecord::new(&execution.id, node_id, Role::User, prompt))
            .await?;

        let result = self.gateway.call(&config.provider, &params, &credentials).await?;

        self.store
            .append_message(&MessageRecord::new(
                &execution.id,
                node_id,
                Role::Assistant,
                result.content.clone(),
            ))
            .await?;

        Ok(NodeOutcome {
            output: Value::String(result.content.clone()),
            call: Some(result),
        })
    }

    async fn tool(&self, config: &ToolConfig, execution: &Execution) -> Result<Value> {
        let args: Map<String, Value> = config
            .args
            .iter()
            .map(|(key, arg)| {
                let value = match arg {
                    ToolArg::Template(t) => Value::String(render(t, execution)),
                    ToolArg::Value(v) => v.clone(),
                };
                (key.clone(), value)
            })
            .collect();

        let Some(tools) = &self.tools else {
            warn!(tool = %config.tool_name, "No tool executor configured, returning simulated result");
            return Ok(serde_json::json!({
                "simulated": true,
                "tool": config.tool_name,
                "args": args,
                "note": "No tool executor is configured; this result was not produced by the tool.",
            }));
        };

        debug!(tool = %config.tool_name, "Dispatching tool call");
        let request = ToolRequest {
            tool_name: config.tool_name.clone(),
            args,
        };
        tools.execute(request).await.map_err(|e| match e {
            e @ WeftError::ToolExecutionFailed { .. } => e,
            other => WeftError::ToolExecutionFailed {
                tool: config.tool_name.clone(),
                message: other.to_string(),
            },
        })
    }
}

fn render(template: &Template, execution: &Execution) -> String {
    template.render(&execution.variables, &execution.results)
}
