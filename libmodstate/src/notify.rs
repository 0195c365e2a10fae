//! Store notifications for async consumers
//!
//! Synchronous listeners registered with
//! [`Store::subscribe`](crate::store::Store::subscribe) run inline after each
//! event. Consumers living on a tokio runtime (a view layer, a log shipper)
//! can instead receive [`StoreEvent`]s from a broadcast channel.
//!
//! Emitting never blocks: with no receivers the notification is dropped,
//! and lagging receivers lose the oldest notifications first.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type StoreEventReceiver = broadcast::Receiver<StoreEvent>;

/// Broadcast fan-out of store notifications
#[derive(Clone)]
pub struct NotifyBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl NotifyBus {
    /// `capacity` is the per-receiver buffer before lagging receivers
    /// start losing notifications. Zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> StoreEventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// What happened to a dispatched event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The event reached its owning module
    Applied {
        event_id: String,
        /// Owning module path
        owner: String,
        /// Paths whose slice changed, in application order
        changed: Vec<String>,
    },

    /// No module owns the event's namespace
    Unhandled { event_id: String },

    /// The composed reducer was replaced (late registration)
    TreeReplaced { modules: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = NotifyBus::new(4);
        let mut receiver = bus.subscribe();

        bus.emit(StoreEvent::Unhandled {
            event_id: "NONEXISTENT/EVENT".to_string(),
        });

        match receiver.recv().await.unwrap() {
            StoreEvent::Unhandled { event_id } => assert_eq!(event_id, "NONEXISTENT/EVENT"),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_receivers_see_same_event() {
        let bus = NotifyBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        let event = StoreEvent::Applied {
            event_id: "USER/LOADING_START".to_string(),
            owner: "USER".to_string(),
            changed: vec!["USER".to_string()],
        };
        bus.emit(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_receivers_is_silent() {
        let bus = NotifyBus::new(0);
        bus.emit(StoreEvent::TreeReplaced { modules: 3 });
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_string(&StoreEvent::Unhandled {
            event_id: "X/Y".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"unhandled","event_id":"X/Y"}"#);
    }
}
