use serde::{Deserialize, Serialize};

/// One decoded increment of a streamed response.
///
/// Content and reasoning arrive on independent channels; a chunk may carry either or both.
/// An event with neither is never emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Fragment of the visible reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,

    /// Fragment of the model's extended reasoning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_delta: Option<String>,
}

impl StreamEvent {
    /// Creates an event, or `None` when both deltas are absent.
    pub fn new(content_delta: Option<String>, reasoning_delta: Option<String>) -> Option<Self> {
        if content_delta.is_none() && reasoning_delta.is_none() {
            None
        } else {
            Some(Self {
                content_delta,
                reasoning_delta,
            })
        }
    }

    /// Creates a content-only event.
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            content_delta: Some(delta.into()),
            reasoning_delta: None,
        }
    }

    /// Creates a reasoning-only event.
    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self {
            content_delta: None,
            reasoning_delta: Some(delta.into()),
        }
    }
}
