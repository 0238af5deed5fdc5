//! Low-level chat completion client.
//!
//! [`LlmClient`] turns a message list and sampling parameters into a completion request,
//! sends it through a [`Transport`], and parses the reply.  It holds no conversation state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::accumulator::AccumulatingSink;
use crate::client::{CHAT_COMPLETIONS_ENDPOINT, HttpTransport, Transport};
use crate::error::{Error, Result};
use crate::pipeline::{DeliveryMode, EventSink, Pipeline, PipelineSummary};
use crate::types::{ContentPart, Message, ModelParams, Response};

/// Client for an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn Transport>,
    model: String,
    endpoint: String,
    delivery: DeliveryMode,
}

impl LlmClient {
    /// Creates a client that sends through `transport`.
    pub fn new(transport: Arc<dyn Transport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            endpoint: CHAT_COMPLETIONS_ENDPOINT.to_string(),
            delivery: DeliveryMode::Synchronous,
        }
    }

    /// Creates a client over HTTP.
    pub fn http(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let transport = HttpTransport::with_options(base_url, api_key, timeout)?;
        Ok(Self::new(Arc::new(transport), model))
    }

    /// Uses a different completion endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Uses a different streaming delivery mode.
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Switches models.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// The model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The completion endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The streaming delivery mode.
    pub fn delivery(&self) -> &DeliveryMode {
        &self.delivery
    }

    /// Builds the JSON body of a completion request.
    ///
    /// A message consisting of a single text part is sent with string content; anything else
    /// is sent as an array of typed parts.
    pub fn build_request(&self, messages: &[Message], params: &ModelParams, stream: bool) -> Value {
        let mut request = Map::new();
        request.insert("model".to_string(), json!(self.model));
        request.insert("temperature".to_string(), json!(params.temperature()));
        request.insert("top_p".to_string(), json!(params.top_p()));
        request.insert("max_tokens".to_string(), json!(params.max_tokens()));
        request.insert(
            "frequency_penalty".to_string(),
            json!(params.frequency_penalty()),
        );
        request.insert(
            "presence_penalty".to_string(),
            json!(params.presence_penalty()),
        );
        request.insert("stream".to_string(), json!(stream));
        request.insert(
            "messages".to_string(),
            Value::Array(messages.iter().map(message_json).collect()),
        );
        Value::Object(request)
    }

    /// Requests a complete reply.
    pub async fn generate(&self, messages: &[Message], params: &ModelParams) -> Result<Response> {
        check_messages(messages)?;
        let request = self.build_request(messages, params, false);
        let body = self.transport.send(&self.endpoint, &request).await?;
        Response::from_completion_json(&body)
    }

    /// Streams a reply into `sink` and returns the accumulated response.
    pub async fn generate_stream(
        &self,
        messages: &[Message],
        params: &ModelParams,
        sink: &mut dyn EventSink,
    ) -> Result<Response> {
        self.generate_stream_cancellable(messages, params, sink, CancellationToken::new())
            .await
    }

    /// Streams a reply into `sink`, stopping with [`Error::Abort`] if `cancel` fires.
    pub async fn generate_stream_cancellable(
        &self,
        messages: &[Message],
        params: &ModelParams,
        sink: &mut dyn EventSink,
        cancel: CancellationToken,
    ) -> Result<Response> {
        check_messages(messages)?;
        let request = self.build_request(messages, params, true);
        let lines = self
            .transport
            .send_streaming(&self.endpoint, &request)
            .await?;
        let pipeline = Pipeline::new(self.delivery.clone()).with_cancellation(cancel);
        let mut accumulator = AccumulatingSink::new(sink);
        pipeline.run(lines, &mut accumulator).await?;
        Ok(accumulator.finish())
    }

    /// Posts an arbitrary JSON body to an arbitrary endpoint and returns the JSON reply.
    pub async fn generate_raw(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let reply = self.transport.send(endpoint, body).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Posts an arbitrary JSON body and streams the decoded reply into `sink`.
    pub async fn generate_stream_raw(
        &self,
        endpoint: &str,
        body: &Value,
        sink: &mut dyn EventSink,
    ) -> Result<PipelineSummary> {
        let lines = self.transport.send_streaming(endpoint, body).await?;
        Pipeline::new(self.delivery.clone()).run(lines, sink).await
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("delivery", &self.delivery)
            .finish()
    }
}

fn check_messages(messages: &[Message]) -> Result<()> {
    if messages.is_empty() {
        return Err(Error::validation(
            "a request needs at least one message",
            Some("messages".to_string()),
        ));
    }
    Ok(())
}

fn message_json(message: &Message) -> Value {
    let content = match message.parts() {
        [ContentPart::Text { text }] => json!(text),
        parts => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::ImageUrl { image_url } => {
                        json!({"type": "image_url", "image_url": {"url": image_url.url}})
                    }
                })
                .collect(),
        ),
    };
    json!({"role": message.role.as_str(), "content": content})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedTransport};
    use crate::types::{ImageRef, Role, StreamEvent};

    fn client(replies: Vec<Reply>) -> (Arc<ScriptedTransport>, LlmClient) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let client = LlmClient::new(transport.clone(), "local-model");
        (transport, client)
    }

    #[test]
    fn request_shape() {
        let (_, client) = client(vec![]);
        let image = ImageRef::from_base64("image/jpeg", "AAAA").unwrap();
        let messages = vec![
            Message::system("sys"),
            Message::new(
                Role::User,
                vec![ContentPart::text("what is it"), ContentPart::image(image)],
            )
            .unwrap(),
        ];
        let params = ModelParams::builder()
            .temperature(0.5)
            .max_tokens(64)
            .build()
            .unwrap();
        let request = client.build_request(&messages, &params, true);
        assert_eq!(
            request,
            json!({
                "model": "local-model",
                "temperature": 0.5,
                "top_p": 0.9,
                "max_tokens": 64,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0,
                "stream": true,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": [
                        {"type": "text", "text": "what is it"},
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                    ]}
                ]
            })
        );
    }

    #[tokio::test]
    async fn generate_parses_reply() {
        let (transport, client) = client(vec![Reply::completion_with_usage("Hi there", 12)]);
        let response = client
            .generate(&[Message::user("Hello")], &ModelParams::default())
            .await
            .unwrap();
        assert_eq!(response.content, "Hi there");
        assert_eq!(response.total_tokens, Some(12));
        let requests = transport.requests();
        assert_eq!(requests[0].0, CHAT_COMPLETIONS_ENDPOINT);
        assert_eq!(requests[0].1["stream"], false);
    }

    #[tokio::test]
    async fn generate_stream_forwards_and_accumulates() {
        let (transport, client) = client(vec![Reply::deltas(&["Hel", "lo"])]);
        let mut seen = vec![];
        let mut sink = |event: &StreamEvent| {
            seen.extend(event.content_delta.clone());
            Ok(())
        };
        let response = client
            .generate_stream(&[Message::user("Hi")], &ModelParams::default(), &mut sink)
            .await
            .unwrap();
        assert_eq!(response.content, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(transport.requests()[0].1["stream"], true);
    }

    #[tokio::test]
    async fn empty_request_never_reaches_transport() {
        let (transport, client) = client(vec![]);
        let err = client
            .generate(&[], &ModelParams::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn service_failures_propagate() {
        let (_, client) = client(vec![Reply::Fail(Error::service(503, "busy"))]);
        let err = client
            .generate(&[Message::user("Hello")], &ModelParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn raw_passthrough() {
        let (transport, client) = client(vec![Reply::Body("{\"data\":[1,2]}".into())]);
        let reply = client
            .generate_raw("v1/models", &json!({"anything": true}))
            .await
            .unwrap();
        assert_eq!(reply["data"][1], 2);
        assert_eq!(transport.requests()[0].0, "v1/models");
    }
}
