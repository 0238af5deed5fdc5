//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::memory::DEFAULT_MEMORY_PATH;
use crate::prompt::{DEFAULT_SYSTEM_PROMPT, USER_MESSAGE_PLACEHOLDER};

/// Environment variable consulted when no API key is given.
pub const API_KEY_ENV: &str = "COLLOQUY_API_KEY";

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "local-model";

/// Messages kept by the window policy when unconfigured.
pub const DEFAULT_WINDOW_MESSAGES: usize = 50;

/// Token budget of the tokens policy when unconfigured.
pub const DEFAULT_TOKEN_BUDGET: u32 = 4096;

/// Command-line arguments for the colloquy-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the completion server.
    #[arrrg(optional, "Server base URL (default: http://localhost:1234)", "URL")]
    pub base_url: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: local-model)", "MODEL")]
    pub model: Option<String>,

    /// API key sent as a bearer token.
    #[arrrg(optional, "API key (default: $COLLOQUY_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 90)", "SECONDS")]
    pub timeout: Option<u64>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Template wrapped around every user message.
    #[arrrg(optional, "User message template containing {user_message}", "TEMPLATE")]
    pub template: Option<String>,

    /// Memory policy.
    #[arrrg(optional, "Memory policy: window, tokens, or file (default: window)", "POLICY")]
    pub memory: Option<String>,

    /// Window size for the window policy.
    #[arrrg(optional, "Messages kept by the window policy (default: 50)", "N")]
    pub window: Option<u32>,

    /// Token budget for the tokens policy.
    #[arrrg(optional, "Token budget for the tokens policy (default: 4096)", "TOKENS")]
    pub token_budget: Option<u32>,

    /// History file for the file policy.
    #[arrrg(optional, "History file for the file policy", "PATH")]
    pub memory_file: Option<String>,

    /// Delay between streamed deltas.
    #[arrrg(optional, "Delay between streamed deltas in ms (default: 0)", "MS")]
    pub pacing_ms: Option<u64>,

    /// Response cache size.  The cache serves blocking turns only; streamed REPL turns
    /// bypass it.
    #[arrrg(optional, "Response cache entries for blocking turns, 0 disables (default: 1000)", "N")]
    pub cache_capacity: Option<u32>,

    /// Response cache TTL.
    #[arrrg(optional, "Response cache TTL in seconds for blocking turns (default: 600)", "SECONDS")]
    pub cache_ttl: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// How the session retains history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// Keep the last N messages.
    Window(usize),

    /// Keep as many recent messages as fit a token budget.
    Tokens(u32),

    /// Keep everything in a JSON file.
    File(PathBuf),
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        MemoryPolicy::Window(DEFAULT_WINDOW_MESSAGES)
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the completion server.
    pub base_url: String,

    /// The model to use for generating responses.
    pub model: String,

    /// Bearer token, if the server wants one.
    pub api_key: Option<String>,

    /// Connect and total request timeout.
    pub timeout: Duration,

    /// System prompt seeded into every conversation.
    pub system_prompt: String,

    /// Template applied to each user message.
    pub user_template: String,

    /// Memory retention policy.
    pub memory: MemoryPolicy,

    /// Delay before each streamed delta is shown.  Zero delivers inline.
    pub pacing: Duration,

    /// Response cache size.  Zero disables the cache.  Only blocking turns
    /// (`ChatSession::chat` and friends) consult it; streamed turns never do.
    pub cache_capacity: usize,

    /// Response cache TTL.
    pub cache_ttl: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: USER_MESSAGE_PLACEHOLDER.to_string(),
            memory: MemoryPolicy::default(),
            pacing: Duration::ZERO,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            use_color: true,
        }
    }

    /// Sets the server base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the user template.
    pub fn with_user_template(mut self, template: impl Into<String>) -> Self {
        self.user_template = template.into();
        self
    }

    /// Sets the memory policy.
    pub fn with_memory(mut self, memory: MemoryPolicy) -> Self {
        self.memory = memory;
        self
    }

    /// Sets the delay between streamed deltas.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the response cache size and TTL.
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let memory = match args.memory.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("window") => MemoryPolicy::Window(
                args.window
                    .map_or(DEFAULT_WINDOW_MESSAGES, |n| n as usize),
            ),
            Some("tokens") => MemoryPolicy::Tokens(args.token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET)),
            Some("file") => MemoryPolicy::File(PathBuf::from(
                args.memory_file
                    .unwrap_or_else(|| DEFAULT_MEMORY_PATH.to_string()),
            )),
            Some(other) => {
                return Err(Error::validation(
                    format!("unknown memory policy {other:?}; use window, tokens, or file"),
                    Some("memory".to_string()),
                ));
            }
        };
        if matches!(memory, MemoryPolicy::Window(0) | MemoryPolicy::Tokens(0)) {
            return Err(Error::validation(
                "memory bound must be at least 1",
                Some("memory".to_string()),
            ));
        }
        if args.timeout == Some(0) {
            return Err(Error::validation(
                "timeout must be at least one second",
                Some("timeout".to_string()),
            ));
        }
        let api_key = args
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty());

        let defaults = ChatConfig::new();
        Ok(ChatConfig {
            base_url: args.base_url.unwrap_or(defaults.base_url),
            model: args.model.unwrap_or(defaults.model),
            api_key,
            timeout: args.timeout.map_or(defaults.timeout, Duration::from_secs),
            system_prompt: args.system.unwrap_or(defaults.system_prompt),
            user_template: args.template.unwrap_or(defaults.user_template),
            memory,
            pacing: args.pacing_ms.map_or(Duration::ZERO, Duration::from_millis),
            cache_capacity: args
                .cache_capacity
                .map_or(defaults.cache_capacity, |n| n as usize),
            cache_ttl: args.cache_ttl.map_or(defaults.cache_ttl, Duration::from_secs),
            use_color: !args.no_color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.base_url, "http://localhost:1234");
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.system_prompt, "You are a helpful, friendly AI assistant.");
        assert_eq!(config.user_template, "{user_message}");
        assert_eq!(config.memory, MemoryPolicy::Window(50));
        assert_eq!(config.pacing, Duration::ZERO);
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            base_url: Some("http://gpu-box:8080".to_string()),
            model: Some("qwen3-8b".to_string()),
            api_key: Some("sk-local".to_string()),
            timeout: Some(30),
            system: Some("Be terse.".to_string()),
            template: Some("Q: {user_message}".to_string()),
            memory: Some("tokens".to_string()),
            token_budget: Some(2048),
            pacing_ms: Some(15),
            cache_capacity: Some(0),
            no_color: true,
            ..ChatArgs::default()
        };
        let config = ChatConfig::try_from(args).unwrap();
        assert_eq!(config.base_url, "http://gpu-box:8080");
        assert_eq!(config.model, "qwen3-8b");
        assert_eq!(config.api_key.as_deref(), Some("sk-local"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.system_prompt, "Be terse.");
        assert_eq!(config.user_template, "Q: {user_message}");
        assert_eq!(config.memory, MemoryPolicy::Tokens(2048));
        assert_eq!(config.pacing, Duration::from_millis(15));
        assert_eq!(config.cache_capacity, 0);
        assert!(!config.use_color);
    }

    #[test]
    fn file_policy_defaults_path() {
        let args = ChatArgs {
            memory: Some("FILE".to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::try_from(args).unwrap();
        assert_eq!(
            config.memory,
            MemoryPolicy::File(PathBuf::from("chat_logs/chat_memory.json"))
        );
    }

    #[test]
    fn invalid_args_rejected() {
        let unknown = ChatArgs {
            memory: Some("forever".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(unknown).unwrap_err().is_validation());

        let empty_window = ChatArgs {
            window: Some(0),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(empty_window).unwrap_err().is_validation());

        let zero_timeout = ChatArgs {
            timeout: Some(0),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::try_from(zero_timeout).unwrap_err().is_validation());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_base_url("http://127.0.0.1:1234")
            .with_model("llava")
            .with_api_key(Some("k".to_string()))
            .with_timeout(Duration::from_secs(5))
            .with_system_prompt("sys")
            .with_user_template("<{user_message}>")
            .with_memory(MemoryPolicy::File(PathBuf::from("h.json")))
            .with_pacing(Duration::from_millis(20))
            .with_cache(10, Duration::from_secs(1))
            .without_color();
        assert_eq!(config.model, "llava");
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.memory, MemoryPolicy::File(PathBuf::from("h.json")));
        assert_eq!(config.cache_capacity, 10);
        assert!(!config.use_color);
    }
}
