use std::collections::{HashMap, VecDeque};

use zenor_protocol::WebMessage;

type Key = (String, String);

/// Bounded FIFO cache of raw messages keyed by `(chat_id, message_id)`.
///
/// Used to look up the full original of a quoted message. When full, the
/// oldest entry is evicted.
#[derive(Debug)]
pub struct RecentMessages {
    capacity: usize,
    order: VecDeque<Key>,
    messages: HashMap<Key, WebMessage>,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            messages: HashMap::new(),
        }
    }

    /// Store `message` under its chat and id. Messages without either are skipped.
    pub fn insert(&mut self, chat_id: &str, message: &WebMessage) {
        if self.capacity == 0 {
            return;
        }
        let Some(id) = message.key.id.as_deref().filter(|id| !id.is_empty()) else {
            return;
        };
        let key = (chat_id.to_string(), id.to_string());
        if self.messages.insert(key.clone(), message.clone()).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.messages.remove(&oldest);
            }
        }
    }

    pub fn get(&self, chat_id: &str, id: &str) -> Option<&WebMessage> {
        self.messages.get(&(chat_id.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
