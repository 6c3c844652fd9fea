//! Graph documents used across test suites, as JSON.

use serde_json::{json, Value};

use crate::mocks::MOCK_MODEL;

/// start → model-call("Summarize {{topic}}") → end
pub fn summarize_graph(provider: &str) -> Value {
    json!({
        "id": "summarize",
        "name": "Summarize",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "llm", "type": "model-call", "data": {
                "provider": provider,
                "model": MOCK_MODEL,
                "prompt": "Summarize {{topic}}"
            }},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": "llm"},
            {"id": "e2", "source": "llm", "target": "end"}
        ]
    })
}

/// Two model calls, the second reading the first one's output.
pub fn chained_graph(provider: &str) -> Value {
    json!({
        "id": "chained",
        "name": "Chained",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "draft", "type": "model-call", "data": {
                "provider": provider,
                "model": MOCK_MODEL,
                "systemPrompt": "You write drafts.",
                "prompt": "Draft a note about {{topic}}"
            }},
            {"id": "polish", "type": "model-call", "data": {
                "provider": provider,
                "model": MOCK_MODEL,
                "prompt": "Polish: {{node_draft_output}}"
            }},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "draft"},
            {"source": "draft", "target": "polish"},
            {"source": "polish", "target": "end"}
        ]
    })
}

/// start → condition(expression) → "true"/"false" transforms.
pub fn condition_graph(expression: &str) -> Value {
    json!({
        "id": "branching",
        "name": "Branching",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "check", "type": "condition", "data": {"condition": expression}},
            {"id": "yes", "type": "transform", "data": {"expression": "took yes"}},
            {"id": "no", "type": "transform", "data": {"expression": "took no"}}
        ],
        "edges": [
            {"source": "start", "target": "check"},
            {"source": "check", "target": "yes", "sourceHandle": "true"},
            {"source": "check", "target": "no", "sourceHandle": "false"}
        ]
    })
}

/// Condition with only a `"true"` edge.
pub fn one_branch_graph(expression: &str) -> Value {
    json!({
        "id": "one-branch",
        "name": "One branch",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "check", "type": "condition", "data": {"condition": expression}},
            {"id": "yes", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "check"},
            {"source": "check", "target": "yes", "handle": "true"}
        ]
    })
}

/// start → a → b → a …
pub fn cycle_graph() -> Value {
    json!({
        "id": "cycle",
        "name": "Cycle",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "a", "type": "transform", "data": {"expression": "a"}},
            {"id": "b", "type": "transform", "data": {"expression": "b"}}
        ],
        "edges": [
            {"source": "start", "target": "a"},
            {"source": "a", "target": "b"},
            {"source": "b", "target": "a"}
        ]
    })
}

/// No start node; a model-call is the entry.
pub fn model_only_graph(provider: &str) -> Value {
    json!({
        "id": "model-only",
        "name": "Model only",
        "nodes": [
            {"id": "prep", "type": "transform", "data": {"expression": "unused"}},
            {"id": "ask", "type": "llmNode", "data": {
                "provider": provider,
                "model": MOCK_MODEL,
                "prompt": "Answer {{question}}"
            }},
            {"id": "done", "type": "endNode"}
        ],
        "edges": [{"source": "ask", "target": "done"}]
    })
}

/// start → tool("search", {q: "{{topic}}", limit: 3}) → end
pub fn tool_graph() -> Value {
    json!({
        "id": "tooling",
        "name": "Tooling",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "search", "type": "tool", "data": {
                "toolName": "search",
                "args": {"q": "{{topic}}", "limit": 3}
            }},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "search"},
            {"source": "search", "target": "end"}
        ]
    })
}

/// A graph containing a node type the engine does not know.
pub fn unknown_type_graph() -> Value {
    json!({
        "id": "broken",
        "name": "Broken",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "weird", "type": "fooNode"}
        ],
        "edges": [{"source": "start", "target": "weird"}]
    })
}
