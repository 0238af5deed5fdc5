use std::fmt::Write;

use crate::types::{ContentPart, IMAGE_PLACEHOLDER, Message, ModelParams};

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// Derives the response-cache key for a request.
///
/// The key covers every message's role and text, in order, plus temperature, max tokens,
/// and top-p.  Images contribute a fixed placeholder, never their payload.  Separators are
/// control characters, so no arrangement of text can collide with a different split.
pub fn cache_key(messages: &[Message], params: &ModelParams) -> String {
    let mut key = String::new();
    for message in messages {
        key.push_str(message.role.as_str());
        for part in message.parts() {
            key.push(FIELD_SEPARATOR);
            match part {
                ContentPart::Text { text } => key.push_str(text),
                ContentPart::ImageUrl { .. } => key.push_str(IMAGE_PLACEHOLDER),
            }
        }
        key.push(RECORD_SEPARATOR);
    }
    // Writing to a String cannot fail.
    let _ = write!(
        key,
        "temperature={}{FIELD_SEPARATOR}max_tokens={}{FIELD_SEPARATOR}top_p={}",
        params.temperature(),
        params.max_tokens(),
        params.top_p()
    );
    key
}
