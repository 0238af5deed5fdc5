//! Conversation memory.
//!
//! Three interchangeable retention policies, selected through [`ConversationMemory`]:
//!
//! - [`SlidingWindowMemory`] keeps the most recent N messages.
//! - [`TokenWindowMemory`] keeps as many recent messages as fit a token budget.
//! - [`CachedFileMemory`] keeps everything and mirrors it to a JSON file.
//!
//! `list` always returns a copy; later mutations never show through an earlier snapshot.

mod cached_file;
mod sliding_window;
mod token_window;

use std::path::PathBuf;
use std::sync::Arc;

pub use cached_file::{CachedFileMemory, DEFAULT_MEMORY_PATH};
pub use sliding_window::SlidingWindowMemory;
pub use token_window::TokenWindowMemory;

use crate::error::Result;
use crate::types::Message;

/// A conversation memory using one of the retention policies.
#[derive(Debug, Clone)]
pub enum ConversationMemory {
    /// Bounded by message count.
    SlidingWindow(SlidingWindowMemory),

    /// Bounded by token cost.
    TokenWindow(TokenWindowMemory),

    /// Unbounded and durable.  Shared so that other owners can flush or inspect it.
    CachedFile(Arc<CachedFileMemory>),
}

impl ConversationMemory {
    /// A window of at most `capacity` messages.
    pub fn sliding_window(capacity: usize) -> Result<Self> {
        Ok(ConversationMemory::SlidingWindow(SlidingWindowMemory::new(
            capacity,
        )?))
    }

    /// A window of at most `max_tokens` tokens.
    pub fn token_window(max_tokens: u32) -> Result<Self> {
        Ok(ConversationMemory::TokenWindow(TokenWindowMemory::new(
            max_tokens,
        )?))
    }

    /// A durable history stored at `path`.
    pub fn cached_file(path: impl Into<PathBuf>) -> Self {
        ConversationMemory::CachedFile(Arc::new(CachedFileMemory::open(path)))
    }

    /// Appends a message.  Only durable memory with write-through can fail.
    pub fn add(&mut self, message: Message) -> Result<()> {
        match self {
            ConversationMemory::SlidingWindow(memory) => memory.add(message),
            ConversationMemory::TokenWindow(memory) => memory.add(message),
            ConversationMemory::CachedFile(memory) => memory.add(message)?,
        }
        Ok(())
    }

    /// Snapshot of the retained messages, oldest first.
    pub fn list(&self) -> Vec<Message> {
        match self {
            ConversationMemory::SlidingWindow(memory) => memory.list(),
            ConversationMemory::TokenWindow(memory) => memory.list(),
            ConversationMemory::CachedFile(memory) => memory.list(),
        }
    }

    /// Removes every message, including the backing file's contents for durable memory.
    pub fn clear(&mut self) -> Result<()> {
        match self {
            ConversationMemory::SlidingWindow(memory) => memory.clear(),
            ConversationMemory::TokenWindow(memory) => memory.clear(),
            ConversationMemory::CachedFile(memory) => memory.clear()?,
        }
        Ok(())
    }

    /// Writes durable memory to disk.  A no-op for the in-memory policies.
    pub fn flush(&self) -> Result<()> {
        match self {
            ConversationMemory::CachedFile(memory) => memory.flush(),
            ConversationMemory::SlidingWindow(_) | ConversationMemory::TokenWindow(_) => Ok(()),
        }
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        match self {
            ConversationMemory::SlidingWindow(memory) => memory.len(),
            ConversationMemory::TokenWindow(memory) => memory.len(),
            ConversationMemory::CachedFile(memory) => memory.len(),
        }
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the contents with an earlier snapshot, bypassing eviction.
    pub(crate) fn restore(&mut self, snapshot: Vec<Message>) -> Result<()> {
        match self {
            ConversationMemory::SlidingWindow(memory) => memory.restore(snapshot),
            ConversationMemory::TokenWindow(memory) => memory.restore(snapshot),
            ConversationMemory::CachedFile(memory) => memory.restore(snapshot)?,
        }
        Ok(())
    }
}

impl From<SlidingWindowMemory> for ConversationMemory {
    fn from(memory: SlidingWindowMemory) -> Self {
        ConversationMemory::SlidingWindow(memory)
    }
}

impl From<TokenWindowMemory> for ConversationMemory {
    fn from(memory: TokenWindowMemory) -> Self {
        ConversationMemory::TokenWindow(memory)
    }
}

impl From<CachedFileMemory> for ConversationMemory {
    fn from(memory: CachedFileMemory) -> Self {
        ConversationMemory::CachedFile(Arc::new(memory))
    }
}

impl From<Arc<CachedFileMemory>> for ConversationMemory {
    fn from(memory: Arc<CachedFileMemory>) -> Self {
        ConversationMemory::CachedFile(memory)
    }
}
