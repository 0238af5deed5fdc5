//! Conversational client for OpenAI-compatible chat completion servers.

// Public modules
pub mod accumulator;
pub mod cache;
pub mod capabilities;
pub mod chat;
pub mod client;
pub mod decoder;
pub mod error;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod sse;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports
pub use accumulator::AccumulatingSink;
pub use cache::{CacheStats, ResponseCache};
pub use capabilities::{CapabilityLookup, ModelFeature, ModelRegistry};
pub use chat::{ChatSession, Turn};
pub use client::{HttpTransport, Transport};
pub use decoder::{Decoded, StreamDecoder};
pub use error::{Error, Result};
pub use llm::LlmClient;
pub use memory::{CachedFileMemory, ConversationMemory, SlidingWindowMemory, TokenWindowMemory};
pub use observability::register_biometrics;
pub use pipeline::{DeliveryMode, EventSink, Pacer, Pipeline, PipelineSummary};
pub use prompt::PromptTemplate;
pub use render::PlainTextRenderer;
pub use sse::LineStream;
pub use types::*;
