use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::observability::MEMORY_EVICTIONS;
use crate::types::{Message, Role};

/// History bounded by message count.
///
/// Once full, every `add` evicts the oldest message first.  A leading system message is
/// skipped over as long as something else can be evicted instead.
#[derive(Debug, Clone)]
pub struct SlidingWindowMemory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl SlidingWindowMemory {
    /// Creates an empty window holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::validation(
                "window capacity must be at least 1",
                Some("capacity".to_string()),
            ));
        }
        Ok(Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Maximum number of messages retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a message, evicting first if the window is full.
    pub fn add(&mut self, message: Message) {
        while self.messages.len() >= self.capacity {
            let victim = if self.messages.len() > 1
                && self.messages.front().map(|m| m.role) == Some(Role::System)
            {
                1
            } else {
                0
            };
            self.messages.remove(victim);
            MEMORY_EVICTIONS.click();
        }
        self.messages.push_back(message);
    }

    /// Snapshot of the retained messages, oldest first.
    pub fn list(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn restore(&mut self, messages: Vec<Message>) {
        self.messages = messages.into();
    }
}
