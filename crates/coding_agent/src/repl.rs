//! Line-oriented terminal front end pieces shared by the binary and tests.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use agent_provider::{is_cancelled, CancelSignal, ToolArguments};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tracing::debug;

use crate::tools::{ConfirmationHandler, ToolError};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const ANSWER_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_PREVIEW_CHARS: usize = 200;

/// Stdin lines shared between the prompt loop and confirmation prompts.
pub type SharedLines = Arc<Mutex<UnboundedReceiver<String>>>;

/// Spawns a task forwarding stdin lines into a shared receiver.
pub fn spawn_stdin_lines() -> SharedLines {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    debug!(%error, "stdin read failed");
                    break;
                }
            }
        }
    });
    Arc::new(Mutex::new(rx))
}

/// What the idle prompt received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    Line(String),
    /// Stdin closed.
    Closed,
    /// Ctrl-C while no request was running.
    Interrupted,
}

/// Waits for the next input line unless `interrupt` resolves first.
///
/// An `interrupt` that fails is logged and the wait falls back to lines only.
pub async fn next_prompt_input<F>(lines: &SharedLines, interrupt: F) -> PromptInput
where
    F: Future<Output = io::Result<()>>,
{
    let read = async { lines.lock().await.recv().await };
    tokio::pin!(read);
    tokio::pin!(interrupt);
    let mut listening = true;
    loop {
        tokio::select! {
            line = &mut read => {
                return match line {
                    Some(line) => PromptInput::Line(line),
                    None => PromptInput::Closed,
                };
            }
            outcome = &mut interrupt, if listening => match outcome {
                Ok(()) => return PromptInput::Interrupted,
                Err(error) => {
                    debug!(%error, "interrupt listener unavailable at prompt");
                    listening = false;
                }
            },
        }
    }
}

/// Asks `Allow <tool>? [y/N]` and reads the answer from the shared lines.
pub struct PromptConfirmation {
    lines: SharedLines,
}

impl PromptConfirmation {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl ConfirmationHandler for PromptConfirmation {
    async fn confirm(
        &self,
        tool_name: &str,
        args: &ToolArguments,
        cancel: &CancelSignal,
    ) -> Result<bool, ToolError> {
        let mut stdout = io::stdout();
        let _ = write!(
            stdout,
            "\n{DIM}{tool_name} {}{RESET}\nAllow {tool_name}? [y/N] ",
            preview_arguments(args)
        );
        let _ = stdout.flush();

        let mut lines = self.lines.lock().await;
        loop {
            if is_cancelled(cancel) {
                return Err(ToolError::Cancelled);
            }
            match tokio::time::timeout(ANSWER_POLL_INTERVAL, lines.recv()).await {
                Ok(Some(answer)) => return Ok(is_affirmative(&answer)),
                Ok(None) => return Ok(false),
                Err(_) => continue,
            }
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// One-line argument summary, truncated on a character boundary.
pub fn preview_arguments(args: &ToolArguments) -> String {
    let rendered = Value::Object(args.clone()).to_string();
    if rendered.chars().count() <= MAX_PREVIEW_CHARS {
        return rendered;
    }
    let mut preview: String = rendered.chars().take(MAX_PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}

/// Terminal rendering of one streamed token; reasoning is dimmed.
pub fn render_token(text: &str, reasoning: bool) -> String {
    if reasoning {
        format!("{DIM}{text}{RESET}")
    } else {
        text.to_string()
    }
}
