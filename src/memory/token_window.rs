use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::observability::MEMORY_EVICTIONS;
use crate::tokens::message_cost;
use crate::types::{Message, Role};

/// History bounded by total token cost.
///
/// A message costs its recorded token count, or an estimate when none is recorded.  After each
/// `add`, messages are evicted oldest-first while the total exceeds the budget and more than
/// one message remains.  A leading system message is evicted last.
#[derive(Debug, Clone)]
pub struct TokenWindowMemory {
    messages: VecDeque<Message>,
    max_tokens: u32,
    current_tokens: u64,
}

impl TokenWindowMemory {
    /// Creates an empty window with the given token budget.
    pub fn new(max_tokens: u32) -> Result<Self> {
        if max_tokens == 0 {
            return Err(Error::validation(
                "token budget must be at least 1",
                Some("max_tokens".to_string()),
            ));
        }
        Ok(Self {
            messages: VecDeque::new(),
            max_tokens,
            current_tokens: 0,
        })
    }

    /// The token budget.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Total cost of the retained messages.
    pub fn current_tokens(&self) -> u64 {
        self.current_tokens
    }

    /// Appends a message and evicts down to the budget.
    pub fn add(&mut self, message: Message) {
        self.current_tokens += u64::from(message_cost(&message));
        self.messages.push_back(message);
        while self.current_tokens > u64::from(self.max_tokens) && self.messages.len() > 1 {
            let victim = if self.messages.len() > 2
                && self.messages.front().map(|m| m.role) == Some(Role::System)
            {
                1
            } else {
                0
            };
            if let Some(evicted) = self.messages.remove(victim) {
                self.current_tokens -= u64::from(message_cost(&evicted));
                MEMORY_EVICTIONS.click();
            }
        }
    }

    /// Snapshot of the retained messages, oldest first.
    pub fn list(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.current_tokens = 0;
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
        self.current_tokens = crate::tokens::total_cost(&messages);
        self.messages = messages.into();
    }
}
