use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use weft_core::error::{Result, WeftError};

use crate::template::Template;

/// A node as it appears in a graph document.
///
/// `data` is type-specific and decoded when the graph is compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Node type name, e.g. `model-call`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data,
        }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, "start", Value::Null)
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, "end", Value::Null)
    }

    pub fn model_call(
        id: impl Into<String>,
        provider: &str,
        model: &str,
        prompt: &str,
    ) -> Self {
        Self::new(
            id,
            "model-call",
            serde_json::json!({"provider": provider, "model": model, "prompt": prompt}),
        )
    }

    pub fn condition(id: impl Into<String>, expression: &str) -> Self {
        Self::new(id, "condition", serde_json::json!({"condition": expression}))
    }

    pub fn transform(id: impl Into<String>, expression: &str) -> Self {
        Self::new(id, "transform", serde_json::json!({"expression": expression}))
    }

    pub fn tool(id: impl Into<String>, tool: &str, args: Value) -> Self {
        Self::new(id, "tool", serde_json::json!({"toolName": tool, "args": args}))
    }
}

/// Settings for a model-call node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelCallData {
    provider: String,
    model: String,
    prompt: String,
    #[serde(default, alias = "system_prompt")]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default, alias = "max_tokens")]
    max_tokens: Option<u32>,
    #[serde(default, alias = "top_p")]
    top_p: Option<f32>,
    #[serde(default)]
    stop: Vec<String>,
    #[serde(default, alias = "frequency_penalty")]
    frequency_penalty: Option<f32>,
    #[serde(default, alias = "presence_penalty")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ModelCallConfig {
    pub provider: String,
    pub model: String,
    pub prompt: Template,
    pub system_prompt: Option<Template>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConditionData {
    #[serde(alias = "expression")]
    condition: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TransformData {
    #[serde(alias = "transform")]
    expression: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolData {
    #[serde(rename = "toolName", alias = "tool")]
    tool_name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

/// Tool arguments. Top-level strings are templates; everything else passes through.
#[derive(Debug, Clone)]
pub enum ToolArg {
    Template(Template),
    Value(Value),
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub tool_name: String,
    pub args: Vec<(String, ToolArg)>,
}

/// Every node kind the engine can run, with its decoded settings.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Start,
    ModelCall(ModelCallConfig),
    Condition(Template),
    Transform(Template),
    Tool(ToolConfig),
    End,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ModelCall(_) => "model-call",
            Self::Condition(_) => "condition",
            Self::Transform(_) => "transform",
            Self::Tool(_) => "tool",
            Self::End => "end",
        }
    }

    /// Decode a raw node into its kind. Unknown type names are rejected.
    pub fn compile(node: &Node) -> Result<Self> {
        let invalid = |e: serde_json::Error| {
            WeftError::InvalidGraph(format!(
                "node '{}' ({}) has invalid data: {}",
                node.id, node.kind, e
            ))
        };

        match node.kind.as_str() {
            "start" | "startNode" => Ok(Self::Start),
            "end" | "endNode" => Ok(Self::End),
            "model-call" | "llmNode" => {
                let data: ModelCallData = serde_json::from_value(node.data.clone()).map_err(invalid)?;
                Ok(Self::ModelCall(ModelCallConfig {
                    provider: data.provider,
                    model: data.model,
                    prompt: Template::parse(&data.prompt),
                    system_prompt: data.system_prompt.as_deref().map(Template::parse),
                    temperature: data.temperature,
                    max_tokens: data.max_tokens,
                    top_p: data.top_p,
                    stop: data.stop,
                    frequency_penalty: data.frequency_penalty,
                    presence_penalty: data.presence_penalty,
                }))
            }
            "condition" | "conditionNode" => {
                let data: ConditionData = serde_json::from_value(node.data.clone()).map_err(invalid)?;
                Ok(Self::Condition(Template::parse(&data.condition)))
            }
            "transform" | "transformNode" => {
                let data: TransformData = serde_json::from_value(node.data.clone()).map_err(invalid)?;
                Ok(Self::Transform(Template::parse(&data.expression)))
            }
            "tool" | "toolNode" => {
                let data: ToolData = serde_json::from_value(node.data.clone()).map_err(invalid)?;
                let args = data
                    .args
                    .into_iter()
                    .map(|(k, v)| {
                        let arg = match v {
                            Value::String(s) => ToolArg::Template(Template::parse(&s)),
                            other => ToolArg::Value(other),
                        };
                        (k, arg)
                    })
                    .collect();
                Ok(Self::Tool(ToolConfig {
                    tool_name: data.tool_name,
                    args,
                }))
            }
            other => Err(WeftError::InvalidGraph(
                WeftError::UnknownNodeType(format!("{} (node '{}')", other, node.id)).to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_aliases() {
        for (name, expected) in [
            ("startNode", "start"),
            ("endNode", "end"),
            ("start", "start"),
        ] {
            let kind = NodeKind::compile(&Node::new("n", name, Value::Null)).unwrap();
            assert_eq!(kind.name(), expected);
        }
        let llm = Node::new(
            "m",
            "llmNode",
            json!({"provider": "openai", "model": "gpt-4o", "prompt": "hi"}),
        );
        assert_eq!(NodeKind::compile(&llm).unwrap().name(), "model-call");
    }

    #[test]
    fn test_model_call_settings() {
        let node = Node::new(
            "m",
            "model-call",
            json!({
                "provider": "anthropic",
                "model": "claude-sonnet-4-20250514",
                "prompt": "Summarize {{topic}}",
                "systemPrompt": "Be brief.",
                "max_tokens": 300,
                "topP": 0.9,
                "stop": ["END"]
            }),
        );
        let NodeKind::ModelCall(cfg) = NodeKind::compile(&node).unwrap() else {
            panic!("expected model-call");
        };
        assert_eq!(cfg.provider, "anthropic");
        assert_eq!(cfg.prompt.variables().collect::<Vec<_>>(), vec!["topic"]);
        assert!(cfg.system_prompt.is_some());
        assert_eq!(cfg.max_tokens, Some(300));
        assert_eq!(cfg.top_p, Some(0.9));
        assert_eq!(cfg.stop, vec!["END"]);
    }

    #[test]
    fn test_unknown_type_is_invalid_graph() {
        let err = NodeKind::compile(&Node::new("x", "fooNode", Value::Null)).unwrap_err();
        assert!(matches!(err, WeftError::InvalidGraph(_)));
        assert!(err.to_string().contains("fooNode"));
    }

    #[test]
    fn test_missing_data_is_invalid_graph() {
        let err = NodeKind::compile(&Node::new("m", "model-call", json!({"model": "x"}))).unwrap_err();
        assert!(matches!(err, WeftError::InvalidGraph(msg) if msg.contains("'m'")));
    }

    #[test]
    fn test_tool_args() {
        let node = Node::tool("t", "search", json!({"q": "{{topic}}", "limit": 5}));
        let NodeKind::Tool(cfg) = NodeKind::compile(&node).unwrap() else {
            panic!("expected tool");
        };
        assert_eq!(cfg.tool_name, "search");
        assert_eq!(cfg.args.len(), 2);
        assert!(cfg
            .args
            .iter()
            .any(|(k, a)| k == "limit" && matches!(a, ToolArg::Value(v) if *v == json!(5))));
    }

    #[test]
    fn test_document_shape() {
        let node: Node = serde_json::from_value(json!({
            "id": "c1",
            "type": "conditionNode",
            "position": {"x": 10, "y": 20},
            "data": {"expression": "{{ok}}"}
        }))
        .unwrap();
        assert_eq!(node.kind, "conditionNode");
        assert_eq!(NodeKind::compile(&node).unwrap().name(), "condition");
    }
}
