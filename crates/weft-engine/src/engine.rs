use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use weft_core::config::EngineConfig;
use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::traits::{CredentialStore, EventSink, ExecutionStore, ToolExecutor};
use weft_core::types::*;
use weft_llm::ModelGateway;

use crate::executors::NodeExecutors;
use crate::graph::{CompiledGraph, EdgePolicy, GraphDefinition};

/// Bookkeeping for a run this engine spawned.
struct RunHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Walks workflow graphs.
///
/// `start` compiles the graph, records the execution as running and hands
/// the run loop to a spawned task. Each run is strictly sequential: a node's
/// result is saved before the next node begins.
#[derive(Clone)]
pub struct ExecutionEngine {
    config: EngineConfig,
    executors: NodeExecutors,
    store: Arc<dyn ExecutionStore>,
    events: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
    runs: Arc<Mutex<HashMap<ExecutionId, RunHandle>>>,
}

impl ExecutionEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<ModelGateway>,
        store: Arc<dyn ExecutionStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            executors: NodeExecutors::new(gateway, credentials, store.clone()),
            config,
            store,
            events: Arc::new(EventBus::default()),
            permits,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the default (unobserved) event bus.
    pub fn set_event_sink(&mut self, events: Arc<dyn EventSink>) {
        self.events = events;
    }

    /// Without one, tool nodes return a labeled simulated result.
    pub fn set_tool_executor(&mut self, tools: Arc<dyn ToolExecutor>) {
        self.executors.set_tool_executor(tools);
    }

    /// Check a graph without running it.
    pub fn compile(&self, graph: &GraphDefinition) -> Result<CompiledGraph> {
        CompiledGraph::compile(graph, EdgePolicy::from(&self.config))
    }

    /// Start a run. The record is saved as pending, then as running, and the
    /// call returns; a graph that fails to compile leaves no record at all.
    pub async fn start(
        &self,
        graph: &GraphDefinition,
        owner: OwnerId,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Execution> {
        let compiled = self.compile(graph)?;

        let mut execution = Execution::new(graph.id.clone(), owner, variables);
        self.persist(&execution).await?;
        execution.mark_running();
        self.persist(&execution).await?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.lock_runs()?.insert(
            execution.id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        info!(
            execution_id = %execution.id,
            graph_id = %execution.graph_id,
            owner = %execution.owner,
            "Execution started"
        );

        let engine = self.clone();
        let run = execution.clone();
        tokio::spawn(async move {
            let id = run.id.clone();
            match engine.permits.clone().acquire_owned().await {
                Ok(_permit) => engine.drive(&compiled, run, &cancel).await,
                Err(e) => {
                    let mut run = run;
                    run.finish(ExecutionStatus::Failed, Some(format!("scheduler closed: {}", e)));
                    engine.persist_final(&run).await;
                }
            }
            if let Ok(mut runs) = engine.runs.lock() {
                runs.remove(&id);
            }
            let _ = done_tx.send(true);
        });

        Ok(execution)
    }

    pub async fn get(&self, id: &ExecutionId) -> Result<Execution> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| WeftError::ExecutionNotFound(id.to_string()))
    }

    /// Request cancellation. The run stops at the next step boundary or
    /// abandons its in-flight node, whichever comes first.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<Execution> {
        let token = self.lock_runs()?.get(id).map(|h| h.cancel.clone());
        if let Some(token) = token {
            info!(execution_id = %id, "Cancellation requested");
            token.cancel();
            return self.get(id).await;
        }

        // Not running here: either orphaned by an earlier process, or owned by
        // another engine sharing the store, which stops at its next step.
        let mut execution = self.get(id).await?;
        if execution.finish(ExecutionStatus::Cancelled, None) {
            warn!(execution_id = %id, "Marking execution cancelled in the store");
            self.persist(&execution).await?;
        }
        Ok(execution)
    }

    pub async fn list(&self, owner: &OwnerId, filter: &ExecutionFilter) -> Result<Vec<Execution>> {
        self.store.list(owner, filter).await
    }

    /// Wait for a run started by this engine to finish, then return the
    /// stored record. Other executions are returned as currently stored.
    pub async fn wait(&self, id: &ExecutionId) -> Result<Execution> {
        let done = self.lock_runs()?.get(id).map(|h| h.done.clone());
        if let Some(mut done) = done {
            while !*done.borrow_and_update() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        }
        self.get(id).await
    }

    /// Number of runs spawned by this engine that have not finished.
    pub fn active_runs(&self) -> usize {
        self.runs.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn lock_runs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ExecutionId, RunHandle>>> {
        self.runs
            .lock()
            .map_err(|e| WeftError::Config(format!("run table poisoned: {}", e)))
    }

    /// The stored record went terminal without this run, e.g. `cancel` from
    /// another process sharing the store.
    async fn finished_elsewhere(&self, id: &ExecutionId) -> Result<bool> {
        Ok(self.store.load(id).await?.is_some_and(|e| e.is_terminal()))
    }

    async fn persist(&self, execution: &Execution) -> Result<()> {
        self.store.save(execution).await?;
        self.events.publish(ExecutionEvent::snapshot(execution));
        Ok(())
    }

    async fn persist_final(&self, execution: &Execution) {
        if let Err(e) = self.persist(execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to save final execution state");
        }
    }

    async fn drive(&self, graph: &CompiledGraph, mut execution: Execution, cancel: &CancellationToken) {
        let outcome = self.run_loop(graph, &mut execution, cancel).await;

        if let Ok(Some(stored)) = self.store.load(&execution.id).await {
            if stored.is_terminal() {
                info!(
                    execution_id = %stored.id,
                    status = %stored.status,
                    "Execution was finished outside this run"
                );
                self.events.publish(ExecutionEvent::snapshot(&stored));
                return;
            }
        }

        let (status, message) = match outcome {
            Ok(()) => (ExecutionStatus::Completed, None),
            Err(WeftError::Cancelled) => (ExecutionStatus::Cancelled, None),
            Err(e) => (ExecutionStatus::Failed, Some(e.to_string())),
        };
        execution.finish(status, message);

        match &execution.error {
            Some(err) => warn!(execution_id = %execution.id, error = %err, "Execution failed"),
            None => info!(
                execution_id = %execution.id,
                status = %execution.status,
                steps = execution.results.len(),
                cost = %execution.usage.cost,
                "Execution finished"
            ),
        }
        self.persist_final(&execution).await;
    }

    async fn run_loop(
        &self,
        graph: &CompiledGraph,
        execution: &mut Execution,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let max_steps = self.config.max_steps;
        let timeout_secs = self.config.node_timeout_secs;
        let mut current = Some(graph.entry());
        let mut steps = 0usize;

        while let Some(index) = current {
            if steps >= max_steps {
                return Err(WeftError::LoopLimitExceeded(max_steps));
            }
            if cancel.is_cancelled() || self.finished_elsewhere(&execution.id).await? {
                return Err(WeftError::Cancelled);
            }

            let node = graph.node(index);
            execution.current_node = Some(node.id.clone());
            self.persist(execution).await?;

            info!(
                execution_id = %execution.id,
                node_id = %node.id,
                kind = node.kind.name(),
                step = steps + 1,
                "Executing node"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WeftError::Cancelled),
                result = bounded(timeout_secs, self.executors.execute(node, execution)) => {
                    match result {
                        Some(outcome) => outcome?,
                        None => {
                            return Err(WeftError::NodeTimeout {
                                node: node.id.clone(),
                                timeout_secs,
                            })
                        }
                    }
                }
            };

            if let Some(call) = &outcome.call {
                execution.usage.record(call);
            }
            let next = graph.next(index, &outcome.output);
            execution.results.insert(node.id.clone(), outcome.output);
            self.persist(execution).await?;
            debug!(execution_id = %execution.id, node_id = %node.id, "Node result saved");

            current = next?;
            steps += 1;
        }

        Ok(())
    }
}

/// Run `fut` for at most `secs` seconds (0 = unbounded). `None` on expiry.
async fn bounded<T>(secs: u64, fut: impl Future<Output = T>) -> Option<T> {
    if secs == 0 {
        return Some(fut.await);
    }
    tokio::time::timeout(Duration::from_secs(secs), fut).await.ok()
}
