//! Room registry for realtime garden chat.
//!
//! One broadcast channel per garden. Channels are created on first subscribe
//! and dropped once nobody is listening.

use std::sync::Arc;

use dashmap::DashMap;
use db::models::chat_message::ChatMessage;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_ROOM_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ChatHub {
    rooms: Arc<DashMap<Uuid, broadcast::Sender<Arc<ChatMessage>>>>,
    capacity: usize,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, room: Uuid) -> broadcast::Receiver<Arc<ChatMessage>> {
        self.rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns how many subscribers received the message.
    pub fn publish(&self, message: ChatMessage) -> usize {
        let room = message.garden_id;
        let Some(sender) = self.rooms.get(&room).map(|entry| entry.value().clone()) else {
            return 0;
        };
        sender.send(Arc::new(message)).unwrap_or(0)
    }

    /// Drop the room if its last subscriber has gone. Call after dropping a receiver.
    pub fn release(&self, room: Uuid) {
        if self
            .rooms
            .remove_if(&room, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            tracing::debug!(%room, "chat room closed");
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
