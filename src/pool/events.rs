use parking_lot::RwLock;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::debug;

use super::{PoolEvent, PoolNotification};
use crate::config::{EVENT_BUFFER_SIZE, EVENT_CHANNEL_CAPACITY};

/// Publishes pool notifications to any number of subscribers and keeps a
/// bounded history for those that connect late.
pub struct EventBus {
    buffer: RwLock<VecDeque<PoolNotification>>,
    sender: broadcast::Sender<PoolNotification>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(EVENT_BUFFER_SIZE)),
            sender,
        }
    }

    pub fn push(&self, notification: PoolNotification) {
        {
            let mut buf = self.buffer.write();
            if buf.len() >= EVENT_BUFFER_SIZE {
                buf.pop_front();
            }
            buf.push_back(notification.clone());
        }

        // No subscribers is fine; history still has it.
        let _ = self.sender.send(notification);
    }

    pub fn emit(&self, source: impl Into<String>, message: impl Into<String>, event: PoolEvent) {
        let notification = PoolNotification::new(source, message, event);
        debug!("{}: {}", notification.source, notification.message);
        self.push(notification);
    }

    pub fn history(&self) -> Vec<PoolNotification> {
        self.buffer.read().iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolNotification> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
