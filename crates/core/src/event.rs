//! Context events — decoupled notifications about engine activity.
//!
//! The engine publishes an event whenever something observable happens.
//! Nothing in the engine depends on events being consumed; presentation
//! layers may subscribe instead of polling statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::context::ContextMode;
use crate::record::Sequence;
use crate::store::EntryKey;

/// All events emitted by the sync controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContextEvent {
    /// A turn was recorded and the tiers advanced
    RecordAppended {
        sequence: Sequence,
        timestamp: DateTime<Utc>,
    },

    /// The tiers were rebuilt from the full history
    TiersRecomputed {
        reason: String,
        text_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// External entries were brought in line with local state
    Reconciled {
        written: Vec<EntryKey>,
        deleted: Vec<EntryKey>,
        timestamp: DateTime<Utc>,
    },

    /// Reconciliation stopped short; local and external state diverge
    ReconcileFailed {
        failed: Vec<EntryKey>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    ModeSwitched {
        mode: ContextMode,
        timestamp: DateTime<Utc>,
    },

    EnabledChanged {
        enabled: bool,
        timestamp: DateTime<Utc>,
    },

    /// Local history and tiers were wiped
    Cleared {
        external: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for context events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ContextEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ContextEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ContextEvent>> {
        self.sender.subscribe()
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

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ContextEvent::ModeSwitched {
            mode: ContextMode::Full,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            ContextEvent::ModeSwitched { mode, .. } => assert_eq!(*mode, ContextMode::Full),
            _ => panic!("Expected ModeSwitched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(ContextEvent::EnabledChanged {
            enabled: true,
            timestamp: Utc::now(),
        });
    }
}
