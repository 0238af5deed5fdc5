//! Streaming delivery pipeline.
//!
//! A [`Pipeline`] consumes the lines of one streamed response, decodes them with a fresh
//! [`StreamDecoder`], and hands every resulting [`StreamEvent`] to an [`EventSink`] in decode
//! order.  Two delivery modes exist:
//!
//! - [`DeliveryMode::Synchronous`] decodes and delivers in the task that reads the network.
//!   A slow sink slows the read.
//! - [`DeliveryMode::Scheduled`] decodes in one future and delivers from a single ordered
//!   queue in another, optionally sleeping between events.  Both futures are joined on the
//!   calling task; there is never more than one delivery worker.
//!
//! In either mode the first failure (transport, decode, or sink) cancels whatever has not yet
//! been delivered and is returned exactly once.  The line source is dropped before `run`
//! returns, whatever the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::decoder::{Decoded, StreamDecoder};
use crate::error::{Error, Result};
use crate::observability::{STREAM_DURATION, STREAM_ERRORS, STREAM_EVENTS};
use crate::sse::LineStream;
use crate::types::StreamEvent;

/// Receives decoded events in order.
///
/// Returning an error stops the pipeline; the error is what the pipeline returns.
pub trait EventSink: Send {
    /// Called once per event.
    fn on_event(&mut self, event: &StreamEvent) -> Result<()>;
}

impl<F> EventSink for F
where
    F: FnMut(&StreamEvent) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &StreamEvent) -> Result<()> {
        self(event)
    }
}

/// Chooses how long to wait before delivering an event in scheduled mode.
pub trait Pacer: Send + Sync {
    /// The delay to apply before `event` is delivered.
    fn delay(&self, event: &StreamEvent) -> Duration;
}

impl Pacer for Duration {
    fn delay(&self, _: &StreamEvent) -> Duration {
        *self
    }
}

/// How decoded events reach the sink.
#[derive(Clone, Default)]
pub enum DeliveryMode {
    /// Deliver inline with decoding.
    #[default]
    Synchronous,

    /// Deliver through an ordered queue, optionally paced.
    Scheduled {
        /// Per-event delay strategy.  `None` delivers as fast as the sink accepts.
        pacer: Option<Arc<dyn Pacer>>,
    },
}

impl DeliveryMode {
    /// Scheduled delivery with a fixed delay before each event.
    pub fn paced(delay: Duration) -> Self {
        DeliveryMode::Scheduled {
            pacer: Some(Arc::new(delay)),
        }
    }
}

impl std::fmt::Debug for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Synchronous => f.write_str("Synchronous"),
            DeliveryMode::Scheduled { pacer } => f
                .debug_struct("Scheduled")
                .field("paced", &pacer.is_some())
                .finish(),
        }
    }
}

/// What a completed run observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Events delivered to the sink.
    pub events: usize,

    /// True if the end sentinel was seen, false if the line source simply ended.
    pub terminated: bool,
}

/// Drives one line source into one sink.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    mode: DeliveryMode,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline with the given delivery mode.
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a synchronous pipeline.
    pub fn synchronous() -> Self {
        Self::new(DeliveryMode::Synchronous)
    }

    /// Creates an unpaced scheduled pipeline.
    pub fn scheduled() -> Self {
        Self::new(DeliveryMode::Scheduled { pacer: None })
    }

    /// Replaces the cancellation token.  Cancelling it aborts any run in progress.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that aborts this pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The delivery mode.
    pub fn mode(&self) -> &DeliveryMode {
        &self.mode
    }

    /// Consumes `lines` until the end sentinel, the end of the source, or the first failure.
    ///
    /// External cancellation yields [`Error::Abort`].
    ///
    /// # Example
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use colloquy::sse::from_lines;
    /// use colloquy::{Pipeline, StreamEvent};
    ///
    /// let lines = from_lines([
    ///     r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
    ///     "data: [DONE]",
    /// ]);
    /// let mut text = String::new();
    /// let mut sink = |event: &StreamEvent| -> colloquy::Result<()> {
    ///     text.push_str(event.content_delta.as_deref().unwrap_or_default());
    ///     Ok(())
    /// };
    /// let summary = Pipeline::synchronous().run(lines, &mut sink).await.unwrap();
    /// assert_eq!(summary.events, 1);
    /// assert!(summary.terminated);
    /// assert_eq!(text, "Hi");
    /// # });
    /// ```
    pub async fn run(
        &self,
        mut lines: LineStream,
        sink: &mut dyn EventSink,
    ) -> Result<PipelineSummary> {
        let start = Instant::now();
        // Internal failures cancel the child only, so a shared token stays usable.
        let cancel = self.cancel.child_token();
        let result = match &self.mode {
            DeliveryMode::Synchronous => deliver_inline(&mut lines, sink, &cancel).await,
            DeliveryMode::Scheduled { pacer } => {
                deliver_scheduled(&mut lines, sink, pacer.as_deref(), &cancel).await
            }
        };
        drop(lines);
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            STREAM_ERRORS.click();
        }
        result
    }
}

fn cancelled() -> Error {
    Error::abort("stream cancelled")
}

async fn deliver_inline(
    lines: &mut LineStream,
    sink: &mut dyn EventSink,
    cancel: &CancellationToken,
) -> Result<PipelineSummary> {
    let mut decoder = StreamDecoder::new();
    let mut summary = PipelineSummary::default();
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            line = lines.next() => line,
        };
        let Some(line) = line else {
            break;
        };
        match decoder.decode(&line?)? {
            Decoded::Event(event) => {
                sink.on_event(&event)?;
                STREAM_EVENTS.click();
                summary.events += 1;
            }
            Decoded::Skip => {}
            Decoded::Done => {
                summary.terminated = true;
                break;
            }
        }
    }
    Ok(summary)
}

async fn deliver_scheduled(
    lines: &mut LineStream,
    sink: &mut dyn EventSink,
    pacer: Option<&dyn Pacer>,
    cancel: &CancellationToken,
) -> Result<PipelineSummary> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

    let produce = async move {
        let mut decoder = StreamDecoder::new();
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                line = lines.next() => line,
            };
            let Some(line) = line else {
                return Ok(false);
            };
            match line.and_then(|line| decoder.decode(&line)) {
                Ok(Decoded::Event(event)) => {
                    if tx.send(event).is_err() {
                        return Ok(false);
                    }
                }
                Ok(Decoded::Skip) => {}
                Ok(Decoded::Done) => return Ok(true),
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
    };

    let deliver = async {
        let mut events = 0;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            if let Some(delay) = pacer.map(|p| p.delay(&event)).filter(|d| !d.is_zero()) {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if let Err(err) = sink.on_event(&event) {
                cancel.cancel();
                return Err(err);
            }
            STREAM_EVENTS.click();
            events += 1;
        }
        Ok(events)
    };

    let (produced, delivered) = tokio::join!(produce, deliver);
    let terminated = produced?;
    let events = delivered?;
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    Ok(PipelineSummary { events, terminated })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::stream;

    use super::*;
    use crate::sse;

    fn content_line(text: &str) -> String {
        format!(r#"data: {{"choices":[{{"delta":{{"content":"{text}"}}}}]}}"#)
    }

    struct Collect(Vec<String>);

    impl EventSink for Collect {
        fn on_event(&mut self, event: &StreamEvent) -> Result<()> {
            self.0.extend(event.content_delta.clone());
            Ok(())
        }
    }

    /// Wraps a line stream so the flag is set once the stream is dropped.
    fn tracked(lines: LineStream, dropped: Arc<AtomicBool>) -> LineStream {
        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let guard = Guard(dropped);
        Box::pin(lines.map(move |line| {
            let _ = &guard;
            line
        }))
    }

    fn hello_lines() -> LineStream {
        sse::from_lines([
            content_line("Hel"),
            String::new(),
            content_line("lo"),
            "data: [DONE]".to_string(),
            "data: {not json".to_string(),
        ])
    }

    #[tokio::test]
    async fn synchronous_delivers_in_order_and_stops_at_done() {
        let mut sink = Collect(vec![]);
        let summary = Pipeline::synchronous()
            .run(hello_lines(), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.0, vec!["Hel", "lo"]);
        assert_eq!(
            summary,
            PipelineSummary {
                events: 2,
                terminated: true
            }
        );
    }

    #[tokio::test]
    async fn scheduled_delivers_in_order() {
        let mut sink = Collect(vec![]);
        let lines: Vec<String> = (0..50).map(|i| content_line(&format!("{i} "))).collect();
        let summary = Pipeline::scheduled()
            .run(sse::from_lines(lines), &mut sink)
            .await
            .unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("{i} ")).collect();
        assert_eq!(sink.0, expected);
        assert_eq!(summary.events, 50);
        assert!(!summary.terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_delivery_waits_between_events() {
        let start = tokio::time::Instant::now();
        let mut sink = Collect(vec![]);
        Pipeline::new(DeliveryMode::paced(Duration::from_millis(30)))
            .run(hello_lines(), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.0, vec!["Hel", "lo"]);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn decode_failure_is_reported_once_and_releases_lines() {
        for pipeline in [Pipeline::synchronous(), Pipeline::scheduled()] {
            let dropped = Arc::new(AtomicBool::new(false));
            let lines = sse::from_lines([
                content_line("a"),
                "data: {\"choices\": [".to_string(),
                content_line("never"),
            ]);
            let mut sink = Collect(vec![]);
            let err = pipeline
                .run(tracked(lines, dropped.clone()), &mut sink)
                .await
                .unwrap_err();
            assert!(err.is_decode(), "{err:?}");
            assert!(!sink.0.contains(&"never".to_string()));
            assert!(dropped.load(Ordering::SeqCst));
            assert!(!pipeline.cancellation_token().is_cancelled());
        }
    }

    #[tokio::test]
    async fn sink_failure_stops_delivery() {
        for pipeline in [Pipeline::synchronous(), Pipeline::scheduled()] {
            let dropped = Arc::new(AtomicBool::new(false));
            let mut seen = 0;
            let mut sink = |_: &StreamEvent| {
                seen += 1;
                if seen == 2 {
                    Err(Error::validation("sink is full", None))
                } else {
                    Ok(())
                }
            };
            let lines = sse::from_lines((0..10).map(|i| content_line(&i.to_string())));
            let err = pipeline
                .run(tracked(lines, dropped.clone()), &mut sink)
                .await
                .unwrap_err();
            assert!(err.is_validation());
            assert_eq!(seen, 2);
            assert!(dropped.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let lines: LineStream = Box::pin(stream::iter(vec![
            Ok(content_line("a")),
            Err(Error::timeout("read timed out", Some(90.0))),
        ]));
        let mut sink = Collect(vec![]);
        let err = Pipeline::synchronous()
            .run(lines, &mut sink)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(sink.0, vec!["a"]);
    }

    #[tokio::test]
    async fn external_cancellation_aborts_a_stalled_stream() {
        for pipeline in [Pipeline::synchronous(), Pipeline::scheduled()] {
            let dropped = Arc::new(AtomicBool::new(false));
            let token = pipeline.cancellation_token();
            let lines: LineStream =
                Box::pin(sse::from_lines([content_line("first")]).chain(stream::pending()));
            let mut sink = move |_: &StreamEvent| {
                token.cancel();
                Ok(())
            };
            let err = pipeline
                .run(tracked(lines, dropped.clone()), &mut sink)
                .await
                .unwrap_err();
            assert!(err.is_abort(), "{err:?}");
            assert!(dropped.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn pre_cancelled_pipeline_consumes_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = Pipeline::scheduled().with_cancellation(token);
        let mut sink = Collect(vec![]);
        let err = pipeline.run(hello_lines(), &mut sink).await.unwrap_err();
        assert!(err.is_abort());
        assert!(sink.0.is_empty());
    }
}
