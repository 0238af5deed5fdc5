//! Line framing for streaming responses.
//!
//! This module converts the raw byte stream of an HTTP response into a stream of protocol
//! lines.  Lines are split on `\n` (a trailing `\r` is dropped), may span any number of
//! network chunks, and a final unterminated line is still delivered when the body ends.

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};

/// Longest line accepted from the service.
pub const MAX_LINE_LENGTH: usize = 1 << 20;

/// A boxed stream of protocol lines.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Frame a byte stream into lines.
///
/// I/O errors whose kind is [`io::ErrorKind::TimedOut`] surface as timeouts; invalid UTF-8
/// and over-long lines surface as decode failures; everything else is a connection failure.
pub fn lines<S>(byte_stream: S) -> LineStream
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let reader = StreamReader::new(byte_stream);
    let framed = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    Box::pin(framed.map(|line| line.map_err(line_error)))
}

/// A line stream over already-split lines.
///
/// Useful for replaying captured streams and for transports that frame lines themselves.
pub fn from_lines<I, L>(lines: I) -> LineStream
where
    I: IntoIterator<Item = L>,
    I::IntoIter: Send + 'static,
    L: Into<String>,
{
    Box::pin(stream::iter(lines.into_iter().map(|line| Ok(line.into()))))
}

fn line_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => Error::decode(
            format!("stream line exceeded {MAX_LINE_LENGTH} bytes"),
            None,
        ),
        LinesCodecError::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut => Error::timeout(format!("stream read timed out: {e}"), None),
            io::ErrorKind::InvalidData => {
                Error::decode(format!("invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
            }
            _ => Error::connection(format!("error in HTTP stream: {e}"), Some(Box::new(e))),
        },
    }
}
