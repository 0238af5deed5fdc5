use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A completed reply from the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    /// The visible reply text.
    pub content: String,

    /// Extended reasoning, if the model produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Total tokens billed for the exchange, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Response {
    /// Creates a response with only content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            total_tokens: None,
        }
    }

    /// Parses the body of a non-streaming completion.
    pub fn from_completion_json(body: &str) -> Result<Self> {
        let completion: ChatCompletion = serde_json::from_str(body).map_err(|e| {
            Error::decode(
                format!("failed to parse completion response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        completion.try_into()
    }
}

/// Wire shape of a non-streaming completion body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    /// Candidate replies; only the first is used.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,

    /// Token accounting, when the service reports it.
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

/// One candidate reply.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    /// The reply message.
    pub message: Option<CompletionMessage>,
}

/// The message inside a candidate reply.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    /// Reply text.
    pub content: Option<String>,

    /// Extended reasoning.
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// Token accounting for an exchange.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CompletionUsage {
    /// Prompt plus completion tokens.
    pub total_tokens: Option<u32>,
}

impl TryFrom<ChatCompletion> for Response {
    type Error = Error;

    fn try_from(completion: ChatCompletion) -> Result<Self> {
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(Error::decode(
                "invalid response: missing or empty choices array",
                None,
            ));
        };
        let Some(CompletionMessage {
            content: Some(content),
            reasoning_content,
        }) = choice.message
        else {
            return Err(Error::decode(
                "invalid response: missing message content",
                None,
            ));
        };
        Ok(Response {
            content,
            reasoning: reasoning_content,
            total_tokens: completion.usage.and_then(|u| u.total_tokens),
        })
    }
}
