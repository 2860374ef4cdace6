//! Domain event outbox

use chain_types::ChainEvent;
use tokio::sync::broadcast;

/// Receives the domain events returned by aggregate operations
pub trait EventOutbox: Send + Sync {
    fn publish(&self, event: ChainEvent);
}

/// Outbox backed by a broadcast channel; events without subscribers are dropped
#[derive(Debug, Clone)]
pub struct BroadcastOutbox {
    tx: broadcast::Sender<ChainEvent>,
}

impl BroadcastOutbox {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastOutbox {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventOutbox for BroadcastOutbox {
    fn publish(&self, event: ChainEvent) {
        tracing::debug!(
            event = event.name(),
            family_id = %event.family_id(),
            "Publishing chain event"
        );
        let _ = self.tx.send(event);
    }
}
