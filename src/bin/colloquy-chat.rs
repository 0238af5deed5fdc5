//! Interactive chat against an OpenAI-compatible completion server.
//!
//! # Usage
//!
//! ```bash
//! # Local server on the default port
//! colloquy-chat
//!
//! # A specific model with durable history
//! colloquy-chat --model qwen3-8b --memory file --memory-file chat_logs/qwen.json
//!
//! # Pace streamed output and disable colors
//! colloquy-chat --pacing-ms 20 --no-color
//! ```
//!
//! Every turn is streamed, so the response cache options have no effect here; they
//! configure blocking turns for library callers of `ChatConfig`.
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::sync::{Arc, Mutex, PoisonError};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use colloquy::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Turn,
    help_text, parse_command,
};
use colloquy::{ImageRef, ModelParams};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("colloquy-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let mut session = ChatSession::from_config(&config)?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;
    let mut think = true;

    // Ctrl-C cancels whichever turn is in flight.
    let current_turn = Arc::new(Mutex::new(CancellationToken::new()));
    let handler_turn = Arc::clone(&current_turn);
    ctrlc::set_handler(move || {
        handler_turn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    })?;

    renderer.print_info(&format!(
        "colloquy chat (model: {}, server: {})",
        session.model(),
        config.base_url
    ))?;
    renderer.print_info("Type /help for commands, /quit to exit\n")?;

    loop {
        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"))?;
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let turn = if let Some(command) = parse_command(line) {
            match command {
                ChatCommand::Quit => {
                    println!("Goodbye!");
                    break;
                }
                ChatCommand::Image { path, prompt } => match ImageRef::from_path(&path) {
                    Ok(image) => Turn::new(prompt).with_image(image),
                    Err(err) => {
                        renderer.print_error(&err.to_string())?;
                        continue;
                    }
                },
                command => {
                    handle_command(command, &mut session, &mut renderer, &mut think)?;
                    continue;
                }
            }
        } else {
            Turn::new(line)
        };

        let turn = if think {
            turn
        } else {
            turn.without_thinking()
        };
        let cancel = CancellationToken::new();
        *current_turn.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        println!("Assistant:");
        match session
            .chat_stream_turn(turn.with_cancellation(cancel), &mut renderer)
            .await
        {
            Ok(_) => renderer.finish_response()?,
            Err(err) if err.is_abort() => renderer.print_interrupted()?,
            Err(err) => renderer.print_error(&err.to_string())?,
        }
    }

    if let Err(err) = session.flush() {
        eprintln!("could not save history: {err}");
    }
    Ok(())
}

fn handle_command(
    command: ChatCommand,
    session: &mut ChatSession,
    renderer: &mut PlainTextRenderer,
    think: &mut bool,
) -> colloquy::Result<()> {
    match command {
        ChatCommand::Reset => {
            session.reset()?;
            renderer.print_info("Conversation cleared.")
        }
        ChatCommand::Think(enabled) => {
            *think = enabled;
            renderer.set_show_reasoning(enabled);
            if enabled {
                renderer.print_info("Reasoning enabled.")
            } else {
                renderer.print_info("Reasoning suppressed.")
            }
        }
        ChatCommand::Flush => match session.flush() {
            Ok(()) => renderer.print_info("History saved."),
            Err(err) => renderer.print_error(&format!("Failed to save history: {err}")),
        },
        ChatCommand::Temperature(value) => {
            let params = session.params().to_builder().temperature(value).build();
            update_params(session, renderer, params, &format!("temperature set to {value:.2}"))
        }
        ChatCommand::MaxTokens(value) => {
            let params = session.params().to_builder().max_tokens(value).build();
            update_params(session, renderer, params, &format!("max_tokens set to {value}"))
        }
        ChatCommand::Params => print_params(renderer, session.params()),
        ChatCommand::Help => {
            for line in help_text().lines() {
                renderer.print_info(&format!("    {line}"))?;
            }
            Ok(())
        }
        ChatCommand::Stats => print_stats(renderer, session),
        ChatCommand::Invalid(message) => renderer.print_error(&message),
        ChatCommand::Quit | ChatCommand::Image { .. } => Ok(()),
    }
}

fn update_params(
    session: &mut ChatSession,
    renderer: &mut PlainTextRenderer,
    params: colloquy::Result<ModelParams>,
    message: &str,
) -> colloquy::Result<()> {
    match params {
        Ok(params) => {
            session.set_params(params);
            renderer.print_info(message)
        }
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

fn print_params(renderer: &mut PlainTextRenderer, params: &ModelParams) -> colloquy::Result<()> {
    renderer.print_info("    Sampling parameters:")?;
    renderer.print_info(&format!("      Temperature: {:.2}", params.temperature()))?;
    renderer.print_info(&format!("      Top-p: {:.2}", params.top_p()))?;
    renderer.print_info(&format!("      Max tokens: {}", params.max_tokens()))?;
    renderer.print_info(&format!(
        "      Frequency penalty: {:.2}",
        params.frequency_penalty()
    ))?;
    renderer.print_info(&format!(
        "      Presence penalty: {:.2}",
        params.presence_penalty()
    ))
}

fn print_stats(renderer: &mut PlainTextRenderer, session: &ChatSession) -> colloquy::Result<()> {
    let stats = session.stats();
    renderer.print_info("    Session Statistics:")?;
    renderer.print_info(&format!("      Model: {}", stats.model))?;
    renderer.print_info(&format!("      Messages: {}", stats.message_count))?;
    renderer.print_info(&format!(
        "      Turns: {} ({} failed, {} cached)",
        stats.turns, stats.failed_turns, stats.cache_hits
    ))?;
    if let Some(tokens) = stats.last_turn_tokens {
        renderer.print_info(&format!("      Last turn tokens: {tokens}"))?;
    }
    let history_tokens = colloquy::tokens::total_cost(&session.history());
    renderer.print_info(&format!("      History tokens: {history_tokens}"))?;
    if let Some(cache) = session.cache() {
        let cache = cache.stats();
        renderer.print_info(&format!(
            "      Cache: {} entries, {:.0}% hit rate",
            cache.entries,
            cache.hit_rate * 100.0
        ))?;
    }
    Ok(())
}
