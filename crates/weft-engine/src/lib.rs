pub mod engine;
pub mod executors;
pub mod graph;
pub mod template;
pub mod tools;

pub use engine::ExecutionEngine;
pub use executors::{NodeExecutors, NodeOutcome};
pub use graph::{CompiledGraph, Edge, GraphDefinition, Node, NodeKind};
pub use template::{resolve, Template};
pub use tools::HttpToolExecutor;
