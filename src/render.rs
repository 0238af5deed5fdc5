//! Terminal rendering for streamed replies.
//!
//! [`PlainTextRenderer`] is an [`EventSink`] that writes content deltas as they arrive and
//! shows reasoning deltas in a dim italic style (or behind a `[thinking]` marker when colors
//! are off).

use std::io::{self, Stdout, Write};

use crate::error::{Error, Result};
use crate::pipeline::EventSink;
use crate::types::StreamEvent;

/// ANSI escape code for dim text.
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text.
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styles.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text.
const ANSI_RED: &str = "\x1b[31m";

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    show_reasoning: bool,
    in_reasoning: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a renderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a renderer on stdout with the specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer on an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            show_reasoning: true,
            in_reasoning: false,
            line_start: true,
        }
    }

    /// Shows or hides reasoning deltas.
    pub fn set_show_reasoning(&mut self, show: bool) {
        self.show_reasoning = show;
    }

    /// Whether reasoning deltas are shown.
    pub fn show_reasoning(&self) -> bool {
        self.show_reasoning
    }

    /// Whether ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Prints an informational line.
    pub fn print_info(&mut self, info: &str) -> Result<()> {
        self.reset_reasoning()?;
        self.write(&format!("{info}\n"))
    }

    /// Prints an error on its own line.
    pub fn print_error(&mut self, error: &str) -> Result<()> {
        self.reset_reasoning()?;
        let lead = if self.line_start { "" } else { "\n" };
        if self.use_color {
            self.write(&format!("{lead}{ANSI_RED}Error: {error}{ANSI_RESET}\n"))
        } else {
            self.write(&format!("{lead}Error: {error}\n"))
        }
    }

    /// Marks a reply cut short by the user.
    pub fn print_interrupted(&mut self) -> Result<()> {
        self.reset_reasoning()?;
        let lead = if self.line_start { "" } else { "\n" };
        self.write(&format!("{lead}[interrupted]\n"))
    }

    /// Ends the current reply.
    pub fn finish_response(&mut self) -> Result<()> {
        self.reset_reasoning()?;
        self.write("\n")
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn reset_reasoning(&mut self) -> Result<()> {
        if !self.in_reasoning {
            return Ok(());
        }
        self.in_reasoning = false;
        if self.use_color {
            self.write(ANSI_RESET)?;
        }
        if !self.line_start {
            self.write("\n")?;
        }
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|err| Error::io("could not write reply", err))?;
        if !text.starts_with('\x1b') {
            self.line_start = text.ends_with('\n');
        }
        Ok(())
    }
}

impl<W: Write + Send> EventSink for PlainTextRenderer<W> {
    fn on_event(&mut self, event: &StreamEvent) -> Result<()> {
        if let Some(reasoning) = event.reasoning_delta.as_deref()
            && self.show_reasoning
        {
            if !self.in_reasoning {
                self.in_reasoning = true;
                if self.use_color {
                    self.write(ANSI_DIM)?;
                    self.write(ANSI_ITALIC)?;
                } else {
                    self.write("[thinking] ")?;
                }
            }
            self.write(reasoning)?;
        }
        if let Some(content) = event.content_delta.as_deref() {
            self.reset_reasoning()?;
            self.write(content)?;
        }
        Ok(())
    }
}
