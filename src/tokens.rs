//! Approximate token accounting.
//!
//! The estimate is deliberately simple: one token per whitespace-delimited word, a flat cost
//! per image, and a fixed per-message overhead.  It is used only where the service does not
//! report usage.

use crate::types::{ContentPart, Message};

/// Tokens charged per message for role and framing.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Tokens charged per image part.
pub const IMAGE_TOKEN_COST: u32 = 100;

/// Estimated tokens in a piece of text.
pub fn estimate_text(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// Estimated tokens for a message, ignoring any stored count.
pub fn estimate_message(message: &Message) -> u32 {
    message
        .parts()
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => estimate_text(text),
            ContentPart::ImageUrl { .. } => IMAGE_TOKEN_COST,
        })
        .fold(MESSAGE_OVERHEAD_TOKENS, u32::saturating_add)
}

/// Cost of a message: its stored token count if known, else the estimate.
pub fn message_cost(message: &Message) -> u32 {
    message
        .token_count
        .unwrap_or_else(|| estimate_message(message))
}

/// Total cost of a sequence of messages.
pub fn total_cost<'a>(messages: impl IntoIterator<Item = &'a Message>) -> u64 {
    messages
        .into_iter()
        .map(|m| u64::from(message_cost(m)))
        .sum()
}
