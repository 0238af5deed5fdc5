use crate::error::Result;
use crate::pipeline::EventSink;
use crate::types::{Response, StreamEvent};

/// An [`EventSink`] that accumulates deltas while forwarding them.
///
/// Each event is recorded before it is forwarded, so the accumulated text always includes
/// everything the inner sink has seen, including the event it rejected.
pub struct AccumulatingSink<'a> {
    inner: &'a mut dyn EventSink,
    content: String,
    reasoning: String,
}

impl<'a> AccumulatingSink<'a> {
    /// Wraps `inner`.
    pub fn new(inner: &'a mut dyn EventSink) -> Self {
        Self {
            inner,
            content: String::new(),
            reasoning: String::new(),
        }
    }

    /// Content accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning accumulated so far.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// The accumulated response.  Streams report no usage, so `total_tokens` is `None`.
    pub fn finish(self) -> Response {
        Response {
            content: self.content,
            reasoning: Some(self.reasoning).filter(|r| !r.is_empty()),
            total_tokens: None,
        }
    }
}

impl EventSink for AccumulatingSink<'_> {
    fn on_event(&mut self, event: &StreamEvent) -> Result<()> {
        if let Some(content) = &event.content_delta {
            self.content.push_str(content);
        }
        if let Some(reasoning) = &event.reasoning_delta {
            self.reasoning.push_str(reasoning);
        }
        self.inner.on_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn accumulates_both_channels() {
        let mut forwarded = vec![];
        let mut inner = |event: &StreamEvent| {
            forwarded.push(event.clone());
            Ok(())
        };
        let mut sink = AccumulatingSink::new(&mut inner);
        sink.on_event(&StreamEvent::reasoning("think ")).unwrap();
        sink.on_event(&StreamEvent::content("Hel")).unwrap();
        sink.on_event(&StreamEvent::new(Some("lo".into()), Some("done".into())).unwrap())
            .unwrap();
        let response = sink.finish();
        assert_eq!(response.content, "Hello");
        assert_eq!(response.reasoning.as_deref(), Some("think done"));
        assert_eq!(forwarded.len(), 3);
    }

    #[test]
    fn no_reasoning_is_none() {
        let mut inner = |_: &StreamEvent| Ok(());
        let mut sink = AccumulatingSink::new(&mut inner);
        sink.on_event(&StreamEvent::content("x")).unwrap();
        assert_eq!(sink.finish().reasoning, None);
    }

    #[test]
    fn inner_failure_is_returned() {
        let mut inner = |_: &StreamEvent| Err(Error::abort("closed"));
        let mut sink = AccumulatingSink::new(&mut inner);
        assert!(sink.on_event(&StreamEvent::content("x")).unwrap_err().is_abort());
        assert_eq!(sink.content(), "x");
    }
}
