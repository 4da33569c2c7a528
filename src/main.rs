//! Gemini chat - terminal front end
//!
//! Reads prompts from stdin and prints the conversation as it grows.

use gemini_chat::llm::{GeminiService, LlmError, LlmService, LoggingService};
use gemini_chat::runtime::{ServiceModel, SessionHandle, SessionNotice, SessionOptions};
use gemini_chat::state_machine::{Author, ConversationState, ImageData, UserEvent};
use gemini_chat::ChatConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "Commands: /image <path>, /clear-image, /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_chat=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let config = ChatConfig::from_env()?;
    let api_key = config.require_api_key()?;

    let gemini = |model_id: &str| -> Result<Arc<dyn LlmService>, LlmError> {
        let service =
            GeminiService::new(api_key, model_id, &config.base_url, config.request_timeout)?;
        Ok(Arc::new(LoggingService::new(Arc::new(service))))
    };
    let model = if config.vision_model == config.text_model {
        ServiceModel::single(gemini(&config.text_model)?)
    } else {
        ServiceModel::new(gemini(&config.text_model)?, gemini(&config.vision_model)?)
    }
    .with_max_tokens(config.max_output_tokens);

    let session = SessionHandle::start(model, SessionOptions::from(&config));
    tracing::info!(
        session_id = %session.session_id(),
        text_model = %config.text_model,
        vision_model = %config.vision_model,
        "Chat session started"
    );

    let renderer = tokio::spawn(render(session.subscribe(), session.notices()));
    println!("{HELP}");

    // Attachment mirrored into the draft until the next send
    let mut attached: Option<ImageData> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_command(&line) else {
            continue;
        };

        let dispatched = match command {
            Command::Quit => break,
            Command::Prompt(text) => {
                let image = attached.take();
                match session
                    .dispatch(UserEvent::update_draft_text(text.as_str()))
                    .await
                {
                    Ok(()) => session.dispatch(UserEvent::send_prompt(text, image)).await,
                    Err(e) => Err(e),
                }
            }
            Command::AttachImage(path) => match load_image(&path).await {
                Ok(image) => {
                    println!("[attached {} ({} bytes)]", path.display(), image.len());
                    attached = Some(image.clone());
                    session
                        .dispatch(UserEvent::update_draft_image(Some(image)))
                        .await
                }
                Err(e) => {
                    println!("[{e}]");
                    continue;
                }
            },
            Command::ClearImage => {
                attached = None;
                session.dispatch(UserEvent::update_draft_image(None)).await
            }
            Command::Unknown(name) => {
                println!("[unknown command {name}] {HELP}");
                continue;
            }
        };

        if let Err(e) = dispatched {
            tracing::error!(error = %e, "Could not reach the session");
            break;
        }
    }

    session.shutdown().await;
    if let Err(e) = renderer.await {
        tracing::error!(error = %e, "Renderer panicked");
    }

    Ok(())
}

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Prompt(String),
    AttachImage(PathBuf),
    ClearImage,
    Quit,
    Unknown(String),
}

/// Interpret one line of input; blank lines mean nothing
fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Some(Command::Prompt(trimmed.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match (name, arg) {
        ("quit" | "exit", _) => Command::Quit,
        ("clear-image", _) => Command::ClearImage,
        ("image", path) if !path.is_empty() => Command::AttachImage(PathBuf::from(path)),
        _ => Command::Unknown(format!("/{name}")),
    })
}

#[derive(Debug, Error)]
enum ImageError {
    #[error("{0} does not look like an image")]
    NotAnImage(String),
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

async fn load_image(path: &Path) -> Result<ImageData, ImageError> {
    let media_type = mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| ImageError::NotAnImage(path.display().to_string()))?;

    let bytes = tokio::fs::read(path).await.map_err(|source| ImageError::Read {
        path: path.display().to_string(),
        source,
    })?;

    Ok(ImageData::new(bytes, media_type.essence_str()))
}

// ============================================================================
// Output
// ============================================================================

/// Print new log entries and notices until the session goes away
async fn render(
    mut state_rx: watch::Receiver<ConversationState>,
    mut notices: broadcast::Receiver<SessionNotice>,
) {
    let mut shown = 0;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                print_new_entries(&state, shown);
                shown = state.log_len();
            }

            notice = notices.recv() => match notice {
                Ok(notice) => print_notice(&notice),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Renderer fell behind on notices");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn print_new_entries(state: &ConversationState, shown: usize) {
    for line in new_entry_lines(state, shown) {
        println!("{line}");
    }
}

/// Lines for the entries added since `shown` were printed, oldest first
fn new_entry_lines(state: &ConversationState, shown: usize) -> Vec<String> {
    let fresh = state.log_len().saturating_sub(shown);
    // The log is newest first
    let mut lines: Vec<String> = state
        .log()
        .take(fresh)
        .rev()
        .map(|message| {
            let speaker = match message.author {
                Author::User => "you",
                Author::Assistant => "gemini",
            };
            match &message.image {
                Some(image) => format!("{speaker} [{}]: {}", image.media_type, message.text),
                None => format!("{speaker}: {}", message.text),
            }
        })
        .collect();
    if fresh > 0 && state.is_waiting() {
        lines.push(format!("[{} awaiting a reply]", state.pending().len()));
    }
    lines
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::GenerationFailed(failure) => {
            let hint = if failure.kind.is_transient() {
                " (try sending it again)"
            } else {
                ""
            };
            println!(
                "[no reply to {:?}: {}{hint}]",
                failure.prompt, failure.message
            );
        }
        SessionNotice::Rejected { reason } => println!("[ignored: {reason}]"),
    }
}
