//! Conversation orchestration for the interactive chat application.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: turn management over memory, template, cache, and client
//! - [`commands`]: slash command parsing
//! - [`fingerprint`]: cache keys for completion requests

mod commands;
mod config;
mod fingerprint;
mod session;

pub use crate::render::PlainTextRenderer;
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    API_KEY_ENV, ChatArgs, ChatConfig, DEFAULT_MODEL, DEFAULT_TOKEN_BUDGET,
    DEFAULT_WINDOW_MESSAGES, MemoryPolicy,
};
pub use fingerprint::cache_key;
pub use session::{
    ChatSession, IMAGE_DESCRIPTION_PREFIX, NO_THINK_SUFFIX, SessionState, SessionStats, Turn,
};
