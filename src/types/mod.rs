// Public modules
pub mod message;
pub mod model_params;
pub mod response;
pub mod stream_event;

// Re-exports
pub use message::{ContentPart, IMAGE_PLACEHOLDER, ImageRef, Message, Role};
pub use model_params::{ModelParams, ModelParamsBuilder};
pub use response::{ChatCompletion, CompletionChoice, CompletionMessage, CompletionUsage, Response};
pub use stream_event::StreamEvent;
