//! Turn loop driving one user request to a terminal outcome.

use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use agent_provider::{
    is_cancelled, CancelSignal, ChatModel, Message, ProviderError, ProviderProfile, Role,
    TokenSink, ToolCall,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tools::{Cancelled, ToolRegistry};

pub const DEFAULT_MAX_TURNS: u32 = 10;
/// Final text when the model answers with neither text nor tool calls.
pub const NO_RESPONSE_PLACEHOLDER: &str = "(no response)";
pub const CANCELLED_MARKER: &str = "[cancelled]";
/// Appended to partial assistant text preserved after cancellation.
pub const INTERRUPTED_SUFFIX: &str = " [interrupted]";
/// Synthetic tool result for calls that never ran.
pub const CANCELLED_BEFORE_EXECUTION: &str = "Cancelled before execution.";

/// Caller-visible per-turn and per-tool text callback.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    pub final_text: String,
    pub turn_count: u32,
    /// Tool names in execution order, repeats included.
    pub tools_used: Vec<String>,
    pub cancelled: bool,
    /// True when the turn budget ran out before the model answered.
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Transport(#[source] ProviderError),
}

enum TurnState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    Cancelled { partial: String },
    Exhausted,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_turns: u32,
    log_sink: Option<LogSink>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.model.profile())
            .field("tools", &self.tools.names())
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            max_turns: DEFAULT_MAX_TURNS,
            log_sink: None,
        }
    }

    /// Sets the turn budget; zero is treated as one.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn profile(&self) -> ProviderProfile {
        self.model.profile()
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Runs model turns until the model answers, the turn budget runs out, or
    /// `cancel` fires.
    ///
    /// Messages are appended to `conversation`; tool calls that never ran get
    /// synthetic results before this returns. Exhaustion and cancellation are
    /// ordinary results; only non-cancellation model failures are errors.
    pub async fn ask(
        &self,
        conversation: &mut Vec<Message>,
        mut on_token: Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<AgentResult, AgentError> {
        let repaired = repair_dangling_tool_calls(conversation);
        if repaired > 0 {
            debug!(repaired, "answered tool calls left over from a cancelled request");
        }

        let mut turn_count = 0_u32;
        let mut tools_used = Vec::new();
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => {
                    if is_cancelled(cancel) {
                        TurnState::Cancelled {
                            partial: String::new(),
                        }
                    } else {
                        self.log(&format!("turn {}: requesting model", turn_count + 1));
                        let schemas = self.tools.schemas();
                        let outcome = self
                            .model
                            .complete(
                                conversation.as_slice(),
                                &schemas,
                                on_token.as_deref_mut(),
                                cancel,
                            )
                            .await;

                        match outcome {
                            Ok(response) => {
                                turn_count += 1;
                                if response.tool_calls.is_empty() {
                                    let text = response
                                        .content
                                        .filter(|content| !content.is_empty())
                                        .unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string());
                                    TurnState::Done(text)
                                } else {
                                    info!(
                                        turn = turn_count,
                                        calls = response.tool_calls.len(),
                                        "model requested tools"
                                    );
                                    conversation.push(Message::assistant_with_tool_calls(
                                        response.content.unwrap_or_default(),
                                        response.tool_calls.clone(),
                                    ));
                                    TurnState::ExecutingTools(response.tool_calls)
                                }
                            }
                            Err(ProviderError::Cancelled { partial }) => {
                                TurnState::Cancelled { partial }
                            }
                            Err(error) => {
                                warn!(turn = turn_count + 1, %error, "model request failed");
                                return Err(AgentError::Transport(error));
                            }
                        }
                    }
                }
                TurnState::ExecutingTools(calls) => {
                    match self
                        .execute_tool_calls(conversation, &calls, &mut tools_used, cancel)
                        .await
                    {
                        Err(Cancelled) => {
                            let skipped = repair_dangling_tool_calls(conversation);
                            debug!(skipped, "answered tool calls that never ran");
                            TurnState::Cancelled {
                                partial: String::new(),
                            }
                        }
                        Ok(()) if turn_count >= self.max_turns => TurnState::Exhausted,
                        Ok(()) => TurnState::AwaitingModel,
                    }
                }
                TurnState::Done(final_text) => {
                    info!(turns = turn_count, tools = tools_used.len(), "request answered");
                    return Ok(AgentResult {
                        final_text,
                        turn_count,
                        tools_used,
                        cancelled: false,
                        exhausted: false,
                    });
                }
                TurnState::Exhausted => {
                    warn!(max_turns = self.max_turns, "turn budget exhausted");
                    return Ok(AgentResult {
                        final_text: format!("Stopped after {} turns for safety.", self.max_turns),
                        turn_count,
                        tools_used,
                        cancelled: false,
                        exhausted: true,
                    });
                }
                TurnState::Cancelled { partial } => {
                    info!(turns = turn_count, "request cancelled");
                    let final_text = if partial.is_empty() {
                        CANCELLED_MARKER.to_string()
                    } else {
                        conversation.push(Message::assistant(format!(
                            "{partial}{INTERRUPTED_SUFFIX}"
                        )));
                        format!("{CANCELLED_MARKER}\n{partial}")
                    };
                    return Ok(AgentResult {
                        final_text,
                        turn_count,
                        tools_used,
                        cancelled: true,
                        exhausted: false,
                    });
                }
            };
        }
    }

    /// Runs `calls` one at a time, checking cancellation before each.
    async fn execute_tool_calls(
        &self,
        conversation: &mut Vec<Message>,
        calls: &[ToolCall],
        tools_used: &mut Vec<String>,
        cancel: &CancelSignal,
    ) -> Result<(), Cancelled> {
        for call in calls {
            if is_cancelled(cancel) {
                debug!(tool = %call.name, "cancelled before tool started");
                return Err(Cancelled);
            }

            self.log(&format!("tool {} started", call.name));
            let output = self.tools.execute(&call.name, &call.arguments, cancel).await?;
            debug!(tool = %call.name, id = %call.id, bytes = output.len(), "tool finished");

            conversation.push(Message::tool_result(call.id.clone(), output));
            tools_used.push(call.name.clone());
            self.log(&format!("tool {} finished", call.name));
        }
        Ok(())
    }

    fn log(&self, line: &str) {
        debug!(target: "coding_agent::turns", "{line}");
        let Some(sink) = self.log_sink.as_ref() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| sink(line))).is_err() {
            warn!("log sink panicked; continuing");
        }
    }
}

/// Answers every tool call of the last tool-calling assistant message that
/// has no result yet with [`CANCELLED_BEFORE_EXECUTION`].
///
/// Results are inserted directly after the existing results for that message,
/// so the tool group stays contiguous even when later messages follow it.
/// Returns the number of results inserted.
pub fn repair_dangling_tool_calls(conversation: &mut Vec<Message>) -> usize {
    let Some(position) = conversation
        .iter()
        .rposition(|message| message.role == Role::Assistant && !message.tool_calls.is_empty())
    else {
        return 0;
    };

    let group_end = position
        + 1
        + conversation[position + 1..]
            .iter()
            .take_while(|message| message.role == Role::Tool)
            .count();
    let answered: HashSet<&str> = conversation[position + 1..group_end]
        .iter()
        .filter_map(|message| message.tool_call_id.as_deref())
        .collect();
    let missing: Vec<Message> = conversation[position]
        .tool_calls
        .iter()
        .filter(|call| !answered.contains(call.id.as_str()))
        .map(|call| Message::tool_result(call.id.clone(), CANCELLED_BEFORE_EXECUTION))
        .collect();

    let count = missing.len();
    conversation.splice(group_end..group_end, missing);
    count
}

#[cfg(test)]
mod tests {
    use agent_provider::ToolArguments;

    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "read_file", ToolArguments::new())
    }

    #[test]
    fn repair_answers_only_missing_calls() {
        let mut conversation = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls("", vec![call("a"), call("b"), call("c")]),
            Message::tool_result("a", "done"),
        ];

        assert_eq!(repair_dangling_tool_calls(&mut conversation), 2);
        let tail: Vec<(Option<&str>, &str)> = conversation[3..]
            .iter()
            .map(|message| (message.tool_call_id.as_deref(), message.content.as_str()))
            .collect();
        assert_eq!(
            tail,
            vec![
                (Some("b"), CANCELLED_BEFORE_EXECUTION),
                (Some("c"), CANCELLED_BEFORE_EXECUTION),
            ]
        );
        assert_eq!(repair_dangling_tool_calls(&mut conversation), 0);
    }

    #[test]
    fn repair_keeps_results_next_to_their_calls() {
        let mut conversation = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls("", vec![call("a"), call("b")]),
            Message::tool_result("a", "done"),
            Message::user("second"),
        ];

        assert_eq!(repair_dangling_tool_calls(&mut conversation), 1);
        let shape: Vec<(Role, Option<&str>)> = conversation
            .iter()
            .map(|message| (message.role, message.tool_call_id.as_deref()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (Role::User, None),
                (Role::Assistant, None),
                (Role::Tool, Some("a")),
                (Role::Tool, Some("b")),
                (Role::User, None),
            ]
        );
    }

    #[test]
    fn repair_ignores_conversations_without_tool_calls() {
        let mut conversation = vec![Message::system("s"), Message::user("hi")];
        assert_eq!(repair_dangling_tool_calls(&mut conversation), 0);
        assert_eq!(conversation.len(), 2);
    }
}
