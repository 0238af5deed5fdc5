//! End-to-end tests through the public API.
//!
//! Most tests run against an in-process stub transport.  The live tests at the bottom need a
//! completion server at `COLLOQUY_TEST_BASE_URL` and are skipped otherwise.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use colloquy::sse::{self, LineStream};
    use colloquy::{
        ChatSession, ConversationMemory, DeliveryMode, Error, ImageRef, LlmClient, Message,
        ModelParams, PromptTemplate, ResponseCache, Result, Role, StreamEvent, Transport,
    };

    enum Canned {
        Body(Value),
        Lines(Vec<String>),
        Fail(Error),
    }

    #[derive(Default)]
    struct StubTransport {
        replies: Mutex<VecDeque<Canned>>,
        bodies: Mutex<Vec<Value>>,
    }

    impl StubTransport {
        fn new(replies: Vec<Canned>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                bodies: Mutex::default(),
            })
        }

        fn bodies(&self) -> Vec<Value> {
            self.bodies.lock().unwrap().clone()
        }

        fn pop(&self, body: &Value) -> Canned {
            self.bodies.lock().unwrap().push(body.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Canned::Fail(Error::connection("no reply scripted", None)))
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, _: &str, body: &Value) -> Result<String> {
            match self.pop(body) {
                Canned::Body(body) => Ok(body.to_string()),
                Canned::Fail(err) => Err(err),
                Canned::Lines(_) => panic!("unexpected blocking request"),
            }
        }

        async fn send_streaming(&self, _: &str, body: &Value) -> Result<LineStream> {
            match self.pop(body) {
                Canned::Lines(lines) => Ok(sse::from_lines(lines)),
                Canned::Fail(err) => Err(err),
                Canned::Body(_) => panic!("unexpected streaming request"),
            }
        }
    }

    fn completion(content: &str) -> Canned {
        Canned::Body(json!({"choices": [{"message": {"content": content}}]}))
    }

    fn stream(deltas: &[&str]) -> Canned {
        let mut lines: Vec<String> = deltas
            .iter()
            .map(|d| format!("data: {}", json!({"choices": [{"delta": {"content": d}}]})))
            .collect();
        lines.push("data: [DONE]".to_string());
        Canned::Lines(lines)
    }

    fn session(transport: Arc<StubTransport>) -> ChatSession {
        let llm = LlmClient::new(transport, "stub-model");
        let memory = ConversationMemory::sliding_window(20).unwrap();
        ChatSession::new(llm, memory, PromptTemplate::default()).unwrap()
    }

    fn transcript(session: &ChatSession) -> Vec<(Role, String)> {
        session
            .history()
            .into_iter()
            .map(|m| (m.role, m.text_content()))
            .collect()
    }

    #[tokio::test]
    async fn blocking_chat_scenario() {
        let transport = StubTransport::new(vec![completion("Hi there")]);
        let mut session = session(transport);
        assert_eq!(session.chat("Hello").await.unwrap(), "Hi there");
        assert_eq!(
            transcript(&session),
            vec![
                (
                    Role::System,
                    "You are a helpful, friendly AI assistant.".to_string()
                ),
                (Role::User, "Hello".to_string()),
                (Role::Assistant, "Hi there".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn streaming_chat_scenario() {
        let transport = StubTransport::new(vec![stream(&["Hel", "lo"])]);
        let mut session = session(transport);
        let mut received = Vec::new();
        let mut sink = |event: &StreamEvent| {
            received.extend(event.content_delta.clone());
            Ok(())
        };
        session.chat_stream("Hi", &mut sink).await.unwrap();
        assert_eq!(received, vec!["Hel".to_string(), "lo".to_string()]);
        let history = session.history();
        let last = history.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.text_content(), "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn paced_streaming_preserves_order() {
        let transport = StubTransport::new(vec![stream(&["a", "b", "c", "d"])]);
        let llm = LlmClient::new(transport, "stub-model")
            .with_delivery(DeliveryMode::paced(Duration::from_millis(25)));
        let memory = ConversationMemory::sliding_window(20).unwrap();
        let mut session = ChatSession::new(llm, memory, PromptTemplate::default()).unwrap();
        let mut received = String::new();
        let mut sink = |event: &StreamEvent| {
            received.push_str(event.content_delta.as_deref().unwrap_or_default());
            Ok(())
        };
        let response = session.chat_stream("go", &mut sink).await.unwrap();
        assert_eq!(received, "abcd");
        assert_eq!(response.content, "abcd");
    }

    #[tokio::test]
    async fn image_description_failure_is_not_fatal() {
        let transport = StubTransport::new(vec![
            completion("That is a lighthouse."),
            Canned::Fail(Error::service(500, "vision backend down")),
        ]);
        let mut session = session(transport.clone());
        let image = ImageRef::from_bytes("image/png", &[0x89, b'P', b'N', b'G']).unwrap();
        let reply = session
            .chat_with_image("What is this?", image)
            .await
            .unwrap();
        assert_eq!(reply, "That is a lighthouse.");
        let history = session.history();
        assert_eq!(history.len(), 3);
        assert!(history[1].has_image());
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(transport.bodies().len(), 2);
    }

    #[tokio::test]
    async fn remote_failure_leaves_memory_untouched() {
        let transport = StubTransport::new(vec![
            completion("one"),
            Canned::Fail(Error::timeout("request timed out", Some(90.0))),
        ]);
        let mut session = session(transport);
        session.chat("first").await.unwrap();
        let before = session.history();
        assert!(session.chat("second").await.unwrap_err().is_timeout());
        assert_eq!(session.history(), before);
    }

    #[tokio::test]
    async fn shared_cache_serves_a_second_session() {
        let cache = Arc::new(ResponseCache::default());
        let first = StubTransport::new(vec![completion("Paris")]);
        let second = StubTransport::new(vec![]);

        let mut a = session(first).with_cache(Arc::clone(&cache));
        let mut b = session(second.clone()).with_cache(Arc::clone(&cache));
        assert_eq!(a.chat("Capital of France?").await.unwrap(), "Paris");
        assert_eq!(b.chat("Capital of France?").await.unwrap(), "Paris");
        assert!(second.bodies().is_empty());
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn token_window_keeps_system_prompt() {
        let transport = StubTransport::new(vec![
            completion("alpha beta gamma"),
            completion("delta epsilon zeta"),
        ]);
        let llm = LlmClient::new(transport, "stub-model");
        let memory = ConversationMemory::token_window(30).unwrap();
        let mut session = ChatSession::new(llm, memory, PromptTemplate::new("sys", "{user_message}"))
            .unwrap();
        session.chat("one two three").await.unwrap();
        session.chat("four five six").await.unwrap();
        let history = session.history();
        assert_eq!(history[0].role, Role::System);
        assert!(colloquy::tokens::total_cost(&history) <= 30);
    }

    #[tokio::test]
    async fn durable_memory_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_memory.json");
        {
            let transport = StubTransport::new(vec![completion("Noted.")]);
            let llm = LlmClient::new(transport, "stub-model");
            let memory = ConversationMemory::cached_file(&path);
            let mut session = ChatSession::new(llm, memory, PromptTemplate::default()).unwrap();
            session.chat("Remember the number 7.").await.unwrap();
            session.flush().unwrap();
        }
        let reopened = ConversationMemory::cached_file(&path);
        let texts: Vec<String> = reopened.list().iter().map(Message::text_content).collect();
        assert_eq!(
            texts,
            vec![
                "You are a helpful, friendly AI assistant.".to_string(),
                "Remember the number 7.".to_string(),
                "Noted.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_params_never_reach_the_transport() {
        assert!(
            ModelParams::builder()
                .temperature(1.5)
                .build()
                .unwrap_err()
                .is_validation()
        );
        let transport = StubTransport::new(vec![]);
        let mut session = session(transport.clone());
        assert!(session.chat("   ").await.unwrap_err().is_validation());
        assert!(transport.bodies().is_empty());
    }

    #[tokio::test]
    async fn live_blocking_chat() {
        let Ok(base_url) = std::env::var("COLLOQUY_TEST_BASE_URL") else {
            eprintln!("Skipping test: COLLOQUY_TEST_BASE_URL not set");
            return;
        };
        let model = std::env::var("COLLOQUY_TEST_MODEL").unwrap_or_else(|_| "local-model".into());
        let llm = LlmClient::http(base_url, None, model, Some(Duration::from_secs(60)))
            .expect("Failed to create client");
        let params = ModelParams::builder().max_tokens(16).build().unwrap();
        let response = llm
            .generate(&[Message::user("Say 'test passed'")], &params)
            .await;
        assert!(response.is_ok(), "Request should succeed: {response:?}");
    }

    #[tokio::test]
    async fn live_streaming_chat() {
        let Ok(base_url) = std::env::var("COLLOQUY_TEST_BASE_URL") else {
            eprintln!("Skipping test: COLLOQUY_TEST_BASE_URL not set");
            return;
        };
        let model = std::env::var("COLLOQUY_TEST_MODEL").unwrap_or_else(|_| "local-model".into());
        let llm = LlmClient::http(base_url, None, model, Some(Duration::from_secs(60)))
            .expect("Failed to create client");
        let params = ModelParams::builder().max_tokens(16).build().unwrap();
        let mut deltas = 0;
        let mut sink = |_: &StreamEvent| {
            deltas += 1;
            Ok(())
        };
        let response = llm
            .generate_stream(&[Message::user("Count to 3")], &params, &mut sink)
            .await;
        assert!(response.is_ok(), "Stream should succeed: {response:?}");
    }
}
