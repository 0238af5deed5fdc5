//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the model.

use std::path::PathBuf;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation and reseed the system prompt.
    Reset,

    /// Toggle extended reasoning (and its display).
    Think(bool),

    /// Send a message with an attached image.
    Image {
        /// Path of the image file.
        path: PathBuf,
        /// Text sent with the image.
        prompt: String,
    },

    /// Write durable memory to disk.
    Flush,

    /// Set the sampling temperature.
    Temperature(f64),

    /// Set the maximum tokens per response.
    MaxTokens(u32),

    /// Show the current sampling parameters.
    Params,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated
/// as a regular message.  Input ending in `/no_think` is a message, not a command.
///
/// # Examples
///
/// ```
/// # use colloquy::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/think off").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "reset" | "clear" => ChatCommand::Reset,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "flush" | "save" => ChatCommand::Flush,
        "params" => ChatCommand::Params,
        "think" | "thinking" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Think(value),
            None => ChatCommand::Invalid("/think expects 'on' or 'off'".to_string()),
        },
        "image" => parse_image_command(argument),
        "temperature" => match argument {
            Some(arg) => match parse_f64_in_range(arg, 0.0, 1.0) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "max_tokens" => match argument.map(str::parse::<u32>) {
            Some(Ok(value)) if value > 0 => ChatCommand::MaxTokens(value),
            Some(_) => ChatCommand::Invalid("/max_tokens expects a positive integer".to_string()),
            None => ChatCommand::Invalid("/max_tokens requires a value".to_string()),
        },
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_image_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/image requires a path and a prompt".to_string());
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let path = parts.next().unwrap_or_default();
    let prompt = parts.next().map(str::trim).filter(|s| !s.is_empty());
    match prompt {
        Some(prompt) => ChatCommand::Image {
            path: PathBuf::from(path),
            prompt: prompt.to_string(),
        },
        None => ChatCommand::Invalid("/image requires a prompt after the path".to_string()),
    }
}

fn parse_f64_in_range(value: &str, min: f64, max: f64) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /reset                 Clear the conversation and start over
  /think on|off          Enable or suppress extended reasoning
  /image <path> <text>   Send an image (jpeg, png, gif, webp) with a prompt
  /temperature <v>       Set temperature 0.0-1.0
  /max_tokens <n>        Set maximum response tokens
  /params                Show sampling parameters
  /flush                 Write durable memory to disk
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while a reply is streaming to cancel it."#
}
