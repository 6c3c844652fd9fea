//! Wires the stack the way the `weft` binary does and runs graphs that
//! never reach the network.

use std::io::Write;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use weft_core::config::AppConfig;
use weft_core::types::{ExecutionFilter, ExecutionStatus, OwnerId};
use weft_engine::{ExecutionEngine, GraphDefinition};

fn engine_for(config: &AppConfig) -> ExecutionEngine {
    let gateway = Arc::new(weft_llm::gateway_from_config(config));
    let store = weft_store::open_store(&config.store).expect("open store");
    ExecutionEngine::new(
        config.engine.clone(),
        gateway,
        store,
        Arc::new(config.providers.clone()),
    )
}

fn write_graph(dir: &std::path::Path, name: &str, doc: Value) -> std::path::PathBuf {
    let path = dir.join(format!("{}.json", name));
    let mut file = std::fs::File::create(&path).expect("create graph");
    file.write_all(doc.to_string().as_bytes()).expect("write graph");
    path
}

#[tokio::test]
async fn test_transform_graph_persists_across_engines() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config: AppConfig = toml::from_str(&format!(
        "[store]\npath = \"{}\"\n",
        dir.path().join("weft.db").display()
    ))
    .expect("parse config");

    let path = write_graph(
        dir.path(),
        "greet",
        json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "greet", "type": "transform", "data": {"expression": "Hello, {{name}}!"}},
                {"id": "end", "type": "end"}
            ],
            "edges": [
                {"source": "start", "target": "greet"},
                {"source": "greet", "target": "end"}
            ]
        }),
    );
    let graph = GraphDefinition::load(&path).expect("load graph");
    assert_eq!(graph.id, "greet");

    let mut vars = Map::new();
    vars.insert("name".into(), json!("Ada"));
    let owner = OwnerId::new("local");

    let engine = engine_for(&config);
    let started = engine.start(&graph, owner.clone(), vars).await.unwrap();
    let finished = engine.wait(&started.id).await.unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(finished.results["greet"], json!("Hello, Ada!"));

    // A second engine over the same database sees the finished run.
    let reopened = engine_for(&config);
    let loaded = reopened.get(&started.id).await.unwrap();
    assert_eq!(loaded.results["greet"], json!("Hello, Ada!"));
    let listed = reopened
        .list(&owner, &ExecutionFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_unconfigured_provider_fails_without_request() {
    let config = AppConfig::default();
    let engine = engine_for(&config);

    let graph: GraphDefinition = serde_json::from_value(json!({
        "id": "ask",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "llm", "type": "model-call", "data": {
                "provider": "anthropic",
                "model": "claude-sonnet-4-20250514",
                "prompt": "Hi"
            }}
        ],
        "edges": [{"source": "start", "target": "llm"}]
    }))
    .unwrap();

    let started = engine
        .start(&graph, OwnerId::new("local"), Map::new())
        .await
        .unwrap();
    let finished = engine.wait(&started.id).await.unwrap();
    assert_eq!(finished.status, ExecutionStatus::Failed);
    assert_eq!(
        finished.error.as_deref(),
        Some("Provider not configured: anthropic")
    );
    assert_eq!(finished.usage.calls, 0);
}
