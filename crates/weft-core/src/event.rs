use crate::traits::EventSink;
use crate::types::ExecutionEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ExecutionEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionId, ExecutionStatus};
    use std::collections::HashMap;

    fn event(status: ExecutionStatus) -> ExecutionEvent {
        ExecutionEvent {
            execution_id: ExecutionId::from_string("e1"),
            node_id: Some("n1".into()),
            status,
            results: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(event(ExecutionStatus::Running));
        bus.publish(event(ExecutionStatus::Completed));

        assert_eq!(rx.recv().await.unwrap().status, ExecutionStatus::Running);
        assert_eq!(rx.recv().await.unwrap().status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(event(ExecutionStatus::Running));
    }
}
