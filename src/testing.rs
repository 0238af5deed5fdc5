use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::Transport;
use crate::error::{Error, Result};
use crate::sse::{self, LineStream};

/// One scripted answer.
#[derive(Debug)]
pub(crate) enum Reply {
    Body(String),
    Lines(Vec<String>),
    Fail(Error),
}

impl Reply {
    pub(crate) fn completion(content: &str) -> Self {
        Reply::Body(json!({"choices": [{"message": {"content": content}}]}).to_string())
    }

    pub(crate) fn completion_with_usage(content: &str, total_tokens: u32) -> Self {
        Reply::Body(
            json!({
                "choices": [{"message": {"content": content}}],
                "usage": {"total_tokens": total_tokens}
            })
            .to_string(),
        )
    }

    pub(crate) fn deltas(deltas: &[&str]) -> Self {
        let mut lines: Vec<String> = deltas
            .iter()
            .map(|d| format!("data: {}", json!({"choices": [{"delta": {"content": d}}]})))
            .collect();
        lines.push("data: [DONE]".to_string());
        Reply::Lines(lines)
    }
}

/// Transport that answers from a script and records every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, endpoint: &str, body: &Value) -> Option<Reply> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, endpoint: &str, body: &Value) -> Result<String> {
        match self.next(endpoint, body) {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Lines(_)) => panic!("streamed reply scripted for a blocking request"),
            None => Err(Error::connection("script exhausted", None)),
        }
    }

    async fn send_streaming(&self, endpoint: &str, body: &Value) -> Result<LineStream> {
        match self.next(endpoint, body) {
            Some(Reply::Lines(lines)) => Ok(sse::from_lines(lines)),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Body(_)) => panic!("blocking reply scripted for a streamed request"),
            None => Err(Error::connection("script exhausted", None)),
        }
    }
}
