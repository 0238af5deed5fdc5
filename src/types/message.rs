use std::fs::File;
use std::io::Read;
use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// Placeholder rendered in place of image payloads wherever text is required.
pub const IMAGE_PLACEHOLDER: &str = "[Image]";

/// The author of a conversation turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions or notes that frame the conversation.
    System,

    /// The human side of the conversation.
    User,

    /// The model side of the conversation.
    Assistant,
}

impl Role {
    /// The lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to an image, held as a `data:` URI or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// The URI the service should fetch or decode.
    pub url: String,
}

impl ImageRef {
    /// Creates an image reference from a URI.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::validation(
                "image URL cannot be empty",
                Some("url".to_string()),
            ));
        }
        Ok(Self { url })
    }

    /// Wraps raw base64 data in a `data:` URI of the given media type.
    pub fn from_base64(media_type: &str, data: &str) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::validation(
                "base64 data cannot be empty",
                Some("data".to_string()),
            ));
        }
        Self::new(format!("data:{media_type};base64,{data}"))
    }

    /// Encodes raw image bytes.
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::from_base64(media_type, &data)
    }

    /// Reads and encodes an image file.
    ///
    /// The media type is determined from the file extension: jpeg, png, gif, or webp.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let media_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => {
                return Err(Error::validation(
                    format!(
                        "unsupported image extension for {}; must be jpeg, png, gif, or webp",
                        path.display()
                    ),
                    Some("image".to_string()),
                ));
            }
        };

        let mut file = File::open(path)
            .map_err(|err| Error::io(format!("failed to open {}", path.display()), err))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Self::from_bytes(media_type, &buffer)
    }
}

/// One part of a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },

    /// An image attachment.
    ImageUrl {
        /// Where the image lives.
        image_url: ImageRef,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Creates an image part.
    pub fn image(image: ImageRef) -> Self {
        ContentPart::ImageUrl { image_url: image }
    }

    /// Returns the text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::ImageUrl { .. } => None,
        }
    }

    /// Returns true if this is an image part.
    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::ImageUrl { .. })
    }
}

/// One turn of a conversation.
///
/// Messages are immutable after construction, except that the token count may be filled in
/// once it becomes known.  A message always carries at least one content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored the turn.
    pub role: Role,

    parts: Vec<ContentPart>,

    /// When the turn was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Token cost reported by the service or estimated locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

impl Message {
    /// Creates a message from content parts.
    ///
    /// Fails with a validation error when `parts` is empty.
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::validation(
                "message content cannot be empty",
                Some("parts".to_string()),
            ));
        }
        Ok(Self {
            role,
            parts,
            created_at: OffsetDateTime::now_utc(),
            token_count: None,
        })
    }

    /// Creates a single-part text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::text(text)],
            created_at: OffsetDateTime::now_utc(),
            token_count: None,
        }
    }

    /// Creates a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Creates a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Creates an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Sets the token count.
    pub fn with_token_count(mut self, token_count: u32) -> Self {
        self.token_count = Some(token_count);
        self
    }

    /// Back-fills the token count once it is known.
    pub fn set_token_count(&mut self, token_count: u32) {
        self.token_count = Some(token_count);
    }

    /// The content parts, in order.
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// Concatenation of all text parts.
    pub fn text_content(&self) -> String {
        self.parts.iter().filter_map(ContentPart::as_text).collect()
    }

    /// Text content with images rendered as a placeholder.
    pub fn display_text(&self) -> String {
        self.parts
            .iter()
            .map(|part| part.as_text().unwrap_or(IMAGE_PLACEHOLDER))
            .collect()
    }

    /// Returns true if any part is an image.
    pub fn has_image(&self) -> bool {
        self.parts.iter().any(ContentPart::is_image)
    }
}
