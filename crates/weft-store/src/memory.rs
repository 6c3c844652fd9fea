use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ExecutionStore;
use weft_core::types::*;

/// Process-local execution store. Used when no database path is configured.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    executions: HashMap<ExecutionId, (u64, Execution)>,
    messages: HashMap<ExecutionId, Vec<MessageRecord>>,
    next_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> WeftError {
    WeftError::Database(e.to_string())
}

impl ExecutionStore for MemoryStore {
    fn save(&self, execution: &Execution) -> BoxFuture<'_, Result<()>> {
        let execution = execution.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().map_err(lock_err)?;
            let existing = inner
                .executions
                .get(&execution.id)
                .map(|(seq, stored)| (*seq, stored.is_terminal()));
            let seq = match existing {
                // Terminal records are final.
                Some((_, true)) => return Ok(()),
                Some((seq, false)) => seq,
                None => {
                    inner.next_seq += 1;
                    inner.next_seq
                }
            };
            inner.executions.insert(execution.id.clone(), (seq, execution));
            Ok(())
        })
    }

    fn load(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Option<Execution>>> {
        let id = id.clone();
        Box::pin(async move {
            let inner = self.inner.lock().map_err(lock_err)?;
            Ok(inner.executions.get(&id).map(|(_, e)| e.clone()))
        })
    }

    fn list(
        &self,
        owner: &OwnerId,
        filter: &ExecutionFilter,
    ) -> BoxFuture<'_, Result<Vec<Execution>>> {
        let owner = owner.clone();
        let filter = filter.clone();
        Box::pin(async move {
            let inner = self.inner.lock().map_err(lock_err)?;
            let mut matched: Vec<&(u64, Execution)> = inner
                .executions
                .values()
                .filter(|(_, e)| e.owner == owner && filter.matches(e))
                .collect();
            // Newest first; insertion order breaks ties.
            matched.sort_by(|(sa, a), (sb, b)| {
                b.created_at.cmp(&a.created_at).then(sb.cmp(sa))
            });
            let limit = filter.limit.unwrap_or(usize::MAX);
            Ok(matched.into_iter().take(limit).map(|(_, e)| e.clone()).collect())
        })
    }

    fn append_message(&self, record: &MessageRecord) -> BoxFuture<'_, Result<()>> {
        let record = record.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().map_err(lock_err)?;
            inner
                .messages
                .entry(record.execution_id.clone())
                .or_default()
                .push(record);
            Ok(())
        })
    }

    fn messages(&self, id: &ExecutionId) -> BoxFuture<'_, Result<Vec<MessageRecord>>> {
        let id = id.clone();
        Box::pin(async move {
            let inner = self.inner.lock().map_err(lock_err)?;
            Ok(inner.messages.get(&id).cloned().unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_list() {
        let store = MemoryStore::new();
        let owner = OwnerId::new("alice");
        let first = Execution::new("g", owner.clone(), Default::default());
        let second = Execution::new("g", owner.clone(), Default::default());
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        store
            .save(&Execution::new("g", OwnerId::new("bob"), Default::default()))
            .await
            .unwrap();

        assert_eq!(store.load(&first.id).await.unwrap().unwrap(), first);
        let listed = store.list(&owner, &ExecutionFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_terminal_record_not_overwritten() {
        let store = MemoryStore::new();
        let mut exec = Execution::new("g", OwnerId::new("alice"), Default::default());
        exec.mark_running();
        store.save(&exec).await.unwrap();

        let mut cancelled = exec.clone();
        cancelled.finish(ExecutionStatus::Cancelled, None);
        store.save(&cancelled).await.unwrap();

        exec.finish(ExecutionStatus::Completed, None);
        store.save(&exec).await.unwrap();
        let stored = store.load(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_messages() {
        let store = MemoryStore::new();
        let id = ExecutionId::new();
        store
            .append_message(&MessageRecord::new(&id, "n", Role::User, "q"))
            .await
            .unwrap();
        store
            .append_message(&MessageRecord::new(&id, "n", Role::Assistant, "a"))
            .await
            .unwrap();
        let records = store.messages(&id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "a");
    }
}
