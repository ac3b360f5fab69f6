//! Deterministic scripted implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and turn-loop testing. Every `complete` call pops the next
//! scripted step and records what the caller sent.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{
    is_cancelled, CancelSignal, ChatModel, LlmResponse, Message, ProviderError, ProviderProfile,
    Role, TokenSink, ToolSchema,
};
use async_trait::async_trait;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One scripted reaction to a `complete` call.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Stream `tokens` in order, then return `response`.
    Respond {
        tokens: Vec<(String, bool)>,
        response: LlmResponse,
    },
    /// Fail the call with the given error.
    Fail(ProviderError),
    /// Stream `partial` as visible text, then block until cancelled.
    AwaitCancel { partial: String },
}

impl ScriptedStep {
    /// Plain text answer streamed word by word.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::Respond {
            tokens: split_words(&content)
                .into_iter()
                .map(|word| (word, false))
                .collect(),
            response: LlmResponse::text(content),
        }
    }

    /// Response that requests tool calls without streaming anything.
    #[must_use]
    pub fn tool_calls(calls: Vec<agent_provider::ToolCall>) -> Self {
        Self::Respond {
            tokens: Vec::new(),
            response: LlmResponse::tool_calls(calls),
        }
    }
}

/// What one `complete` call received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Scripted model used by `coding_agent` tests and offline runs.
///
/// Once the script runs dry, calls echo the latest user message.
#[derive(Debug)]
pub struct ScriptedModel {
    model_id: String,
    token_delay: Duration,
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            model_id: "mock".to_string(),
            token_delay: Duration::ZERO,
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Echo model with a visible streaming pace for interactive use.
    #[must_use]
    pub fn interactive() -> Self {
        Self::new(Vec::new()).with_token_delay(Duration::from_millis(30))
    }

    #[must_use]
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    /// Appends a step to the end of the script.
    pub fn push_step(&self, step: ScriptedStep) {
        lock_unpoisoned(&self.steps).push_back(step);
    }

    /// Snapshot of every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        lock_unpoisoned(&self.steps).len()
    }

    fn next_step(&self, messages: &[Message]) -> ScriptedStep {
        if let Some(step) = lock_unpoisoned(&self.steps).pop_front() {
            return step;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        ScriptedStep::text(format!("mock reply: {last_user}"))
    }

    async fn stream_tokens(
        &self,
        tokens: &[(String, bool)],
        on_token: &mut Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let mut visible = String::new();
        for (text, reasoning) in tokens {
            if is_cancelled(cancel) {
                return Err(ProviderError::Cancelled { partial: visible });
            }
            if let Some(sink) = on_token.as_deref_mut() {
                sink(text, *reasoning);
            }
            if !*reasoning {
                visible.push_str(text);
            }
            if !self.token_delay.is_zero() {
                tokio::time::sleep(self.token_delay).await;
            }
        }
        Ok(visible)
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        mut on_token: Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<LlmResponse, ProviderError> {
        lock_unpoisoned(&self.requests).push(RecordedRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        if is_cancelled(cancel) {
            return Err(ProviderError::Cancelled {
                partial: String::new(),
            });
        }

        match self.next_step(messages) {
            ScriptedStep::Respond { tokens, response } => {
                self.stream_tokens(&tokens, &mut on_token, cancel).await?;
                if is_cancelled(cancel) {
                    return Err(ProviderError::Cancelled {
                        partial: response.content.unwrap_or_default(),
                    });
                }
                Ok(response)
            }
            ScriptedStep::Fail(error) => Err(error),
            ScriptedStep::AwaitCancel { partial } => {
                let tokens = vec![(partial.clone(), false)];
                self.stream_tokens(&tokens, &mut on_token, cancel).await?;
                while !is_cancelled(cancel) {
                    tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
                }
                Err(ProviderError::Cancelled { partial })
            }
        }
    }
}

fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut pending = String::new();
    for ch in text.chars() {
        pending.push(ch);
        if matches!(ch, ' ' | '\n') {
            words.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        words.push(pending);
    }
    words
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
