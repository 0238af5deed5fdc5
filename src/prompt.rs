//! Prompt templates.
//!
//! A [`PromptTemplate`] pairs the system prompt that seeds every conversation with a user
//! template that wraps each user message before it is sent.
//!
//! ```rust
//! use colloquy::PromptTemplate;
//!
//! let template = PromptTemplate::new("You are terse.", "Q: {user_message}\nA:");
//! assert_eq!(template.format_user("why?"), "Q: why?\nA:");
//! ```

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the user's text.
pub const USER_MESSAGE_PLACEHOLDER: &str = "{user_message}";

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, friendly AI assistant.";

/// A system prompt and a user message template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    system_prompt: String,
    user_template: String,
}

impl PromptTemplate {
    /// Creates a template.
    pub fn new(system_prompt: impl Into<String>, user_template: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_template: user_template.into(),
        }
    }

    /// Replaces the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Replaces the user template.
    pub fn with_user_template(mut self, user_template: impl Into<String>) -> Self {
        self.user_template = user_template.into();
        self
    }

    /// The system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The raw user template.
    pub fn user_template(&self) -> &str {
        &self.user_template
    }

    /// Substitutes `user_message` for every placeholder in the user template.
    ///
    /// A template without a placeholder is sent as-is.
    pub fn format_user(&self, user_message: &str) -> String {
        self.user_template
            .replace(USER_MESSAGE_PLACEHOLDER, user_message)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, USER_MESSAGE_PLACEHOLDER)
    }
}
