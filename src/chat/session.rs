//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which manages conversation
//! state, applies the prompt template, consults the response cache, and
//! drives blocking and streaming turns through the low-level client.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cache::ResponseCache;
use crate::capabilities::CapabilityLookup;
use crate::chat::config::{ChatConfig, MemoryPolicy};
use crate::chat::fingerprint::cache_key;
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::memory::ConversationMemory;
use crate::observability::{CHAT_TURN_DURATION, CHAT_TURN_FAILURES, CHAT_TURNS};
use crate::pipeline::{DeliveryMode, EventSink};
use crate::prompt::PromptTemplate;
use crate::tokens;
use crate::types::{ContentPart, ImageRef, Message, ModelParams, Response, Role};

/// Suffix that asks the model to skip extended reasoning.
pub const NO_THINK_SUFFIX: &str = "/no_think";

/// Prefix of the system note that records what an attached image showed.
pub const IMAGE_DESCRIPTION_PREFIX: &str = "[Image description] ";

const IMAGE_DESCRIPTION_PROMPT: &str =
    "Describe this image in one or two sentences. Mention the main subject and any visible text.";

/// Where a session is in its turn cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for a new turn.
    Idle,

    /// A request is in flight.
    AwaitingResponse,
}

/// One user turn.
#[derive(Debug, Clone)]
pub struct Turn {
    text: String,
    image: Option<ImageRef>,
    params: Option<ModelParams>,
    cancel: Option<CancellationToken>,
}

impl Turn {
    /// A text-only turn with the session's default parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            params: None,
            cancel: None,
        }
    }

    /// Attaches an image.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    /// Overrides the sampling parameters for this turn only.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Asks the model to skip extended reasoning for this turn.
    pub fn without_thinking(mut self) -> Self {
        self.text = format!("{} {NO_THINK_SUFFIX}", self.text.trim_end());
        self
    }

    /// Lets the caller abort a streamed turn.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: String,
    /// The number of messages in memory.
    pub message_count: usize,
    /// Turns that completed.
    pub turns: u64,
    /// Turns that failed.
    pub failed_turns: u64,
    /// Turns answered from the response cache.
    pub cache_hits: u64,
    /// Token count recorded for the most recent reply.
    pub last_turn_tokens: Option<u32>,
    /// The default sampling parameters.
    pub params: ModelParams,
}

#[derive(Debug, Default)]
struct Counters {
    turns: u64,
    failed_turns: u64,
    cache_hits: u64,
    last_turn_tokens: Option<u32>,
}

/// The user message as stored and as sent.
struct PreparedTurn {
    stored: Message,
    /// Set when the outgoing text differs from the stored text.
    outgoing: Option<Message>,
    image: Option<ImageRef>,
    params: ModelParams,
}

/// A blocking reply that made it into memory.
struct StoredReply {
    response: Response,
    token_count: u32,
    cached: bool,
}

/// A chat session that manages conversation state and model interactions.
///
/// The first message in memory is the system prompt.  Each turn appends the user's message
/// and, if the model answers, the assistant's reply.  A failed blocking turn leaves memory
/// exactly as it was; a failed streamed turn keeps the user's message but stores no reply.
pub struct ChatSession {
    llm: LlmClient,
    memory: ConversationMemory,
    template: PromptTemplate,
    params: ModelParams,
    cache: Option<Arc<ResponseCache>>,
    capabilities: Option<Arc<dyn CapabilityLookup>>,
    describe_images: bool,
    state: SessionState,
    counters: Counters,
}

impl ChatSession {
    /// Creates a session.
    ///
    /// Empty memory is seeded with the template's system prompt.  Memory that already holds
    /// history (a reopened durable store) is resumed as-is.
    pub fn new(
        llm: LlmClient,
        mut memory: ConversationMemory,
        template: PromptTemplate,
    ) -> Result<Self> {
        if memory.is_empty() {
            memory.add(Message::system(template.system_prompt()))?;
        }
        Ok(Self {
            llm,
            memory,
            template,
            params: ModelParams::default(),
            cache: None,
            capabilities: None,
            describe_images: true,
            state: SessionState::Idle,
            counters: Counters::default(),
        })
    }

    /// Builds a session over HTTP from a configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let delivery = if config.pacing.is_zero() {
            DeliveryMode::Synchronous
        } else {
            DeliveryMode::paced(config.pacing)
        };
        let llm = LlmClient::http(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
            Some(config.timeout),
        )?
        .with_delivery(delivery);
        let memory = match &config.memory {
            MemoryPolicy::Window(capacity) => ConversationMemory::sliding_window(*capacity)?,
            MemoryPolicy::Tokens(max_tokens) => ConversationMemory::token_window(*max_tokens)?,
            MemoryPolicy::File(path) => ConversationMemory::cached_file(path),
        };
        let template = PromptTemplate::new(&config.system_prompt, &config.user_template);
        let mut session = Self::new(llm, memory, template)?;
        if config.cache_capacity > 0 {
            let cache = ResponseCache::new(config.cache_capacity, config.cache_ttl)?;
            session = session.with_cache(Arc::new(cache));
        }
        Ok(session)
    }

    /// Sets the default sampling parameters.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Answers repeated blocking requests from `cache`.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Checks image turns against `capabilities` before sending them.
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityLookup>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Enables or disables the follow-up request that describes attached images.
    pub fn with_image_descriptions(mut self, describe: bool) -> Self {
        self.describe_images = describe;
        self
    }

    /// Sends a message and waits for the whole reply.
    pub async fn chat(&mut self, text: &str) -> Result<String> {
        Ok(self.chat_turn(Turn::new(text)).await?.content)
    }

    /// Like [`chat`](Self::chat), with explicit sampling parameters.
    pub async fn chat_with_params(&mut self, text: &str, params: &ModelParams) -> Result<String> {
        let turn = Turn::new(text).with_params(*params);
        Ok(self.chat_turn(turn).await?.content)
    }

    /// Sends a message with an image and waits for the whole reply.
    pub async fn chat_with_image(&mut self, text: &str, image: ImageRef) -> Result<String> {
        let turn = Turn::new(text).with_image(image);
        Ok(self.chat_turn(turn).await?.content)
    }

    /// Runs a blocking turn.
    pub async fn chat_turn(&mut self, turn: Turn) -> Result<Response> {
        let prepared = self.prepare(turn.text, turn.image, turn.params)?;
        let start = Instant::now();
        let snapshot = self.memory.list();
        let result = self.blocking_exchange(&prepared).await;
        self.state = SessionState::Idle;
        CHAT_TURN_DURATION.add(start.elapsed().as_secs_f64());
        let stored = match result {
            Ok(stored) => stored,
            Err(err) => {
                self.roll_back(snapshot, &err);
                return Err(err);
            }
        };
        if stored.cached {
            self.counters.cache_hits += 1;
        }
        self.complete_turn(&prepared, stored.token_count).await;
        Ok(stored.response)
    }

    /// Streams the reply into `sink` and returns it once complete.
    pub async fn chat_stream(&mut self, text: &str, sink: &mut dyn EventSink) -> Result<Response> {
        self.chat_stream_turn(Turn::new(text), sink).await
    }

    /// Like [`chat_stream`](Self::chat_stream), with explicit sampling parameters.
    pub async fn chat_stream_with_params(
        &mut self,
        text: &str,
        params: &ModelParams,
        sink: &mut dyn EventSink,
    ) -> Result<Response> {
        self.chat_stream_turn(Turn::new(text).with_params(*params), sink)
            .await
    }

    /// Streams the reply to a message with an image.
    pub async fn chat_stream_with_image(
        &mut self,
        text: &str,
        image: ImageRef,
        sink: &mut dyn EventSink,
    ) -> Result<Response> {
        self.chat_stream_turn(Turn::new(text).with_image(image), sink)
            .await
    }

    /// Runs a streamed turn.
    ///
    /// Deltas reach `sink` as they arrive.  If the stream fails, whatever the sink already
    /// received stays delivered but nothing is stored for the assistant.
    pub async fn chat_stream_turn(
        &mut self,
        turn: Turn,
        sink: &mut dyn EventSink,
    ) -> Result<Response> {
        let cancel = turn.cancel.unwrap_or_default();
        let prepared = self.prepare(turn.text, turn.image, turn.params)?;
        let start = Instant::now();
        let snapshot = self.memory.list();
        if let Err(err) = self.memory.add(prepared.stored.clone()) {
            self.roll_back(snapshot, &err);
            return Err(err);
        }
        let with_user = self.memory.list();
        self.state = SessionState::AwaitingResponse;
        let outgoing = self.outgoing_messages(&prepared);
        let result = self
            .llm
            .generate_stream_cancellable(&outgoing, &prepared.params, sink, cancel)
            .await;
        self.state = SessionState::Idle;
        CHAT_TURN_DURATION.add(start.elapsed().as_secs_f64());
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };
        let token_count = match self.store_reply(&response) {
            Ok(token_count) => token_count,
            Err(err) => {
                self.roll_back(with_user, &err);
                return Err(err);
            }
        };
        self.complete_turn(&prepared, token_count).await;
        Ok(response)
    }

    /// Clears memory and reseeds the system prompt.
    pub fn reset(&mut self) -> Result<()> {
        self.memory.clear()?;
        self.memory
            .add(Message::system(self.template.system_prompt()))?;
        self.state = SessionState::Idle;
        tracing::info!(model = %self.llm.model(), "chat session reset");
        Ok(())
    }

    /// Snapshot of the conversation.
    pub fn history(&self) -> Vec<Message> {
        self.memory.list()
    }

    /// The conversation memory.
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Writes durable memory to disk.
    pub fn flush(&self) -> Result<()> {
        self.memory.flush()
    }

    /// The current turn state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The default sampling parameters.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Replaces the default sampling parameters.
    pub fn set_params(&mut self, params: ModelParams) {
        self.params = params;
    }

    /// The prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// The model in use.
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Switches models.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.llm.set_model(model);
    }

    /// The response cache, if any.
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.llm.model().to_string(),
            message_count: self.memory.len(),
            turns: self.counters.turns,
            failed_turns: self.counters.failed_turns,
            cache_hits: self.counters.cache_hits,
            last_turn_tokens: self.counters.last_turn_tokens,
            params: self.params,
        }
    }

    fn record_failure(&mut self, err: &Error) {
        self.counters.failed_turns += 1;
        CHAT_TURN_FAILURES.click();
        tracing::debug!(model = %self.llm.model(), error = %err, "chat turn failed");
    }

    /// Records the failure and puts memory back to `snapshot`.
    fn roll_back(&mut self, snapshot: Vec<Message>, err: &Error) {
        self.record_failure(err);
        if let Err(restore_err) = self.memory.restore(snapshot) {
            tracing::warn!(error = %restore_err, "could not roll back failed turn");
        }
    }

    fn prepare(
        &self,
        text: String,
        image: Option<ImageRef>,
        params: Option<ModelParams>,
    ) -> Result<PreparedTurn> {
        let (text, no_think) = split_no_think(&text);
        if text.trim().is_empty() {
            return Err(Error::validation(
                "message text cannot be empty",
                Some("text".to_string()),
            ));
        }
        if image.is_some()
            && let Some(capabilities) = &self.capabilities
            && !capabilities.is_vision_capable(self.llm.model())
        {
            return Err(Error::validation(
                format!("model {} does not accept images", self.llm.model()),
                Some("image".to_string()),
            ));
        }
        let formatted = self.template.format_user(text);
        let parts = |text: String| {
            let mut parts = vec![ContentPart::text(text)];
            parts.extend(image.clone().map(ContentPart::image));
            parts
        };
        let stored = Message::new(Role::User, parts(formatted.clone()))?;
        let outgoing = if no_think {
            Some(Message::new(
                Role::User,
                parts(format!("{formatted} {NO_THINK_SUFFIX}")),
            )?)
        } else {
            None
        };
        Ok(PreparedTurn {
            stored,
            outgoing,
            image,
            params: params.unwrap_or(self.params),
        })
    }

    fn outgoing_messages(&self, prepared: &PreparedTurn) -> Vec<Message> {
        let mut messages = self.memory.list();
        if let (Some(outgoing), Some(last)) = (&prepared.outgoing, messages.last_mut()) {
            *last = outgoing.clone();
        }
        messages
    }

    /// Adds the user message, obtains a reply from the cache or the model, and stores it.
    ///
    /// Fresh replies enter the cache only once they are in memory.
    async fn blocking_exchange(&mut self, prepared: &PreparedTurn) -> Result<StoredReply> {
        self.memory.add(prepared.stored.clone())?;
        self.state = SessionState::AwaitingResponse;
        let outgoing = self.outgoing_messages(prepared);
        let key = self
            .cache
            .as_ref()
            .map(|_| cache_key(&outgoing, &prepared.params));
        if let (Some(cache), Some(key)) = (&self.cache, &key)
            && let Some(response) = cache.get(key)
        {
            tracing::debug!(model = %self.llm.model(), "answered from response cache");
            let token_count = self.store_reply(&response)?;
            return Ok(StoredReply {
                response,
                token_count,
                cached: true,
            });
        }
        let response = self.llm.generate(&outgoing, &prepared.params).await?;
        let token_count = self.store_reply(&response)?;
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put(key, response.clone());
        }
        Ok(StoredReply {
            response,
            token_count,
            cached: false,
        })
    }

    /// Appends the assistant's reply and returns its token count.
    fn store_reply(&mut self, response: &Response) -> Result<u32> {
        let mut reply = Message::assistant(response.content.as_str());
        let token_count = response
            .total_tokens
            .unwrap_or_else(|| tokens::estimate_message(&reply));
        reply.set_token_count(token_count);
        self.memory.add(reply)?;
        Ok(token_count)
    }

    async fn complete_turn(&mut self, prepared: &PreparedTurn, token_count: u32) {
        self.counters.turns += 1;
        CHAT_TURNS.click();
        self.counters.last_turn_tokens = Some(token_count);
        if let Some(image) = &prepared.image
            && self.describe_images
        {
            self.describe_image(image, &prepared.params).await;
        }
    }

    /// Stores a short description of `image` so the conversation keeps its meaning after the
    /// image itself is evicted.  Failures are logged and otherwise ignored.
    async fn describe_image(&mut self, image: &ImageRef, params: &ModelParams) {
        let request = match Message::new(
            Role::User,
            vec![
                ContentPart::text(IMAGE_DESCRIPTION_PROMPT),
                ContentPart::image(image.clone()),
            ],
        ) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "could not build image description request");
                return;
            }
        };
        let description = match self.llm.generate(&[request], params).await {
            Ok(response) => response.content,
            Err(err) => {
                tracing::warn!(error = %err, "image description failed");
                return;
            }
        };
        let description = description.trim();
        if description.is_empty() {
            return;
        }
        let note = Message::system(format!("{IMAGE_DESCRIPTION_PREFIX}{description}"));
        if let Err(err) = self.memory.add(note) {
            tracing::warn!(error = %err, "could not store image description");
        }
    }
}

/// Splits off a trailing `/no_think`, returning the remaining text and whether it was present.
fn split_no_think(text: &str) -> (&str, bool) {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix(NO_THINK_SUFFIX) {
        Some(rest) => (rest.trim_end(), true),
        None => (text, false),
    }
}
