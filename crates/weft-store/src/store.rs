use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ExecutionStore;
use weft_core::types::*;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        graph_id TEXT NOT NULL,
        owner TEXT NOT NULL,
        status TEXT NOT NULL,
        current_node TEXT,
        variables TEXT NOT NULL,
        results TEXT NOT NULL,
        usage TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        error TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_executions_owner
        ON executions(owner, created_at);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        execution_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_execution
        ON messages(execution_id, id);";

const SELECT_EXECUTION: &str = "SELECT id, graph_id, owner, status, current_node, variables, results,
        usage, created_at, started_at, completed_at, error
     FROM executions";

fn db_err(e: impl std::fmt::Display) -> WeftError {
    WeftError::Database(e.to_string())
}

/// SQLite-backed execution store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WeftError::Database(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Raw column values for one `executions` row.
struct ExecutionRow {
    id: String,
    graph_id: String,
    owner: String,
    status: String,
    current_node: Option<String>,
    variables: String,
    results: String,
    usage: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    error: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            graph_id: row.get(1)?,
            owner: row.get(2)?,
            status: row.get(3)?,
            current_node: row.get(4)?,
            variables: row.get(5)?,
            results: row.get(6)?,
            usage: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            error: row.get(11)?,
        })
    }

    fn into_execution(self) -> Result<Execution> {
        Ok(Execution {
            id: ExecutionId(self.id),
            graph_id: self.graph_id,
            owner: OwnerId(self.owner),
            status: self.status.parse()?,
            current_node: self.current_node,
            variables: serde_json::from_str(&self.variables)?,
            results: serde_json::from_str(&self.results)?,
            usage: serde_json::from_str(&self.usage)?,
            created_at: parse_ts(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_ts).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            error: self.error,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WeftError::Database(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_role(s: &str) -> Role {
    match s {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

impl ExecutionStore for SqliteStore {
    fn save(&self, execution: &Execution) -> BoxFuture<'_, Result<()>> {
        let encoded = (|| -> Result<_> {
            Ok((
                serde_json::to_string(&execution.variables)?,
                serde_json::to_string(&execution.results)?,
                serde_json::to_string(&execution.usage)?,
            ))
        })();
        let execution = execution.clone();

        Box::pin(async move {
            let (variables, results, usage) = encoded?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO executions (id, graph_id, owner, status, current_node, variables,
                     results, usage, created_at, started_at, completed_at, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     current_node = excluded.current_node,
                     variables = excluded.variables,
                     results = excluded.results,
                     usage = excluded.usage,
                     started_at = excluded.started_at,
                     completed_at = excluded.completed_at,
                     error = excluded.error
                 WHERE executions.status NOT IN ('completed', 'failed', 'cancelled')",
                params![
                    execution.id.0,
                    execution.graph_id,
                    execution.owner.0,
                    execution.status.as_str(),
                    execution.current_node,
                    variables,
                    results,
                    usage,
                    execution.created_at.to_rfc3339(),
                    execution.started_at.map(|t| t.to_rfc3339()),
                    execution.completed_at.map(|t| t.to_rfc3339()),
                    execution.error,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn load(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_EXECUTION),
                    params![id],
                    ExecutionRow::from_row,
                )
                .optional()
                .map_err(db_err)?;
            row.map(ExecutionRow::into_execution).transpose()
        })
    }

    fn list(
        &self,
        owner: &OwnerId,
        filter: &ExecutionFilter,
    ) -> BoxFuture<'_, Result<Vec<Execution>>> {
        let owner = owner.0.clone();
        let status = filter.status.map(|s| s.as_str());
        let graph_id = filter.graph_id.clone();
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE owner = ?1
                       AND (?2 IS NULL OR status = ?2)
                       AND (?3 IS NULL OR graph_id = ?3)
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?4",
                    SELECT_EXECUTION
                ))
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![owner, status, graph_id, limit], ExecutionRow::from_row)
                .map_err(db_err)?;

            let mut executions = Vec::new();
            for row in rows {
                executions.push(row.map_err(db_err)?.into_execution()?);
            }
            Ok(executions)
        })
    }

    fn append_message(&self, record: &MessageRecord) -> BoxFuture<'_, Result<()>> {
        let record = record.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO messages (execution_id, node_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.execution_id.0,
                    record.node_id,
                    record.role.as_str(),
                    record.content,
                    record.timestamp.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn messages(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Vec<MessageRecord>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT node_id, role, content, timestamp FROM messages
                     WHERE execution_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![id], |row| {
                    let node_id: String = row.get(0)?;
                    let role: String = row.get(1)?;
                    let content: String = row.get(2)?;
                    let ts: String = row.get(3)?;
                    Ok((node_id, role, content, ts))
                })
                .map_err(db_err)?;

            let mut records = Vec::new();
            for row in rows {
                let (node_id, role, content, ts) = row.map_err(db_err)?;
                records.push(MessageRecord {
                    execution_id: ExecutionId(id.clone()),
                    node_id,
                    role: parse_role(&role),
                    content,
                    timestamp: parse_ts(&ts)?,
                });
            }
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn execution(owner: &str, graph: &str) -> Execution {
        let mut vars = serde_json::Map::new();
        vars.insert("topic".into(), serde_json::json!("ownership"));
        Execution::new(graph, OwnerId::new(owner), vars)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SqliteStore::in_memory().unwrap();
        let mut exec = execution("alice", "g1");
        exec.mark_running();
        exec.current_node = Some("llm".into());
        exec.results.insert("start".into(), serde_json::json!({"topic": "ownership"}));
        exec.usage.cost = BigDecimal::from_str("0.018").unwrap();
        exec.usage.calls = 1;

        store.save(&exec).await.unwrap();
        let loaded = store.load(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.current_node.as_deref(), Some("llm"));
        assert_eq!(loaded.results, exec.results);
        assert_eq!(loaded.variables, exec.variables);
        assert_eq!(loaded.usage.cost, BigDecimal::from_str("0.018").unwrap());
        assert!(loaded.started_at.is_some());

        assert!(store.load(&ExecutionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let mut exec = execution("alice", "g1");
        store.save(&exec).await.unwrap();

        exec.mark_running();
        exec.finish(ExecutionStatus::Failed, Some("boom".into()));
        store.save(&exec).await.unwrap();

        let loaded = store.load(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_row_not_overwritten() {
        let store = SqliteStore::in_memory().unwrap();
        let mut exec = execution("alice", "g1");
        exec.mark_running();
        store.save(&exec).await.unwrap();

        let mut cancelled = exec.clone();
        cancelled.finish(ExecutionStatus::Cancelled, None);
        store.save(&cancelled).await.unwrap();

        exec.results.insert("end".into(), serde_json::json!({"completed": true}));
        exec.finish(ExecutionStatus::Completed, None);
        store.save(&exec).await.unwrap();

        let loaded = store.load(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Cancelled);
        assert!(loaded.results.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_owner_and_status() {
        let store = SqliteStore::in_memory().unwrap();
        let a1 = execution("alice", "g1");
        let mut a2 = execution("alice", "g2");
        a2.mark_running();
        a2.finish(ExecutionStatus::Completed, None);
        let b1 = execution("bob", "g1");
        for e in [&a1, &a2, &b1] {
            store.save(e).await.unwrap();
        }

        let alice = OwnerId::new("alice");
        let all = store.list(&alice, &ExecutionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let done = ExecutionFilter {
            status: Some(ExecutionStatus::Completed),
            ..Default::default()
        };
        let completed = store.list(&alice, &done).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, a2.id);

        let limited = ExecutionFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(store.list(&alice, &limited).await.unwrap().len(), 1);

        let by_graph = ExecutionFilter {
            graph_id: Some("g1".into()),
            ..Default::default()
        };
        let g1 = store.list(&alice, &by_graph).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g1[0].id, a1.id);
    }

    #[tokio::test]
    async fn test_messages_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let id = ExecutionId::new();
        store
            .append_message(&MessageRecord::new(&id, "llm", Role::User, "Summarize ownership"))
            .await
            .unwrap();
        store
            .append_message(&MessageRecord::new(&id, "llm", Role::Assistant, "Values have one owner."))
            .await
            .unwrap();

        let records = store.messages(&id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].content, "Values have one owner.");
        assert!(store.messages(&ExecutionId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("weft.db");
        let store = SqliteStore::open(&path).unwrap();
        store.save(&execution("alice", "g")).await.unwrap();
        assert!(path.exists());
    }
}
