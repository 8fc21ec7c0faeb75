use crate::chat::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Realtime events fanned out to socket clients. Every event names the room
/// (canonical conversation identifier) it belongs to; receivers drop events
/// for rooms they have not joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// An already-persisted message relayed to its conversation room.
    ConversationMessage(ChatMessage),

    /// Transient typing signal; never persisted, auto-cleared client-side.
    Typing {
        conversation_id: String,
        sender_id: String,
        active: bool,
    },
}

impl Event {
    /// The room this event is addressed to.
    pub fn room(&self) -> &str {
        match self {
            Event::ConversationMessage(msg) => &msg.conversation_id,
            Event::Typing {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}
