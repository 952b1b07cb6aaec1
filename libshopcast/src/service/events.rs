//! Progress events
//!
//! An in-process broadcast bus. The dispatcher and engagement sync emit
//! events as they work; the binaries subscribe to print progress. Emitting
//! never blocks, and events are dropped when nobody is subscribed.
//!
//! ```no_run
//! use libshopcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PostClaimed {
//!     post_id: "abc123".to_string(),
//!     platform: "instagram".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer; lagging subscribers lose the oldest events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means there are no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A due post was claimed for publishing
    PostClaimed { post_id: String, platform: String },

    PostPublished {
        post_id: String,
        platform: String,
        external_id: String,
        permalink: String,
    },

    PostFailed {
        post_id: String,
        platform: String,
        error: String,
    },

    /// A dispatcher run finished
    BatchCompleted {
        reclaimed: u64,
        claimed: usize,
        posted: usize,
        failed: usize,
        skipped: usize,
    },

    /// An engagement sync run finished
    SyncCompleted {
        checked: usize,
        updated: usize,
        failed: usize,
        deleted: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.emit(Event::PostClaimed {
            post_id: "p1".to_string(),
            platform: "pinterest".to_string(),
        });

        match receiver.recv().await.unwrap() {
            Event::PostClaimed { post_id, platform } => {
                assert_eq!(post_id, "p1");
                assert_eq!(platform, "pinterest");
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = Event::BatchCompleted {
            reclaimed: 1,
            claimed: 3,
            posted: 2,
            failed: 1,
            skipped: 0,
        };
        bus.emit(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.emit(Event::SyncCompleted {
            checked: 0,
            updated: 0,
            failed: 0,
            deleted: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::PostFailed {
            post_id: "p9".to_string(),
            platform: "instagram".to_string(),
            error: "Media container 1789 timed out".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"post_failed""#));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
