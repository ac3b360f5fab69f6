use std::future::Future;
use std::time::Duration;

use agent_provider::{
    is_cancelled as signal_is_cancelled, CancelSignal, LlmResponse, Message, TokenSink, ToolSchema,
};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::assembler::ResponseAssembler;
use crate::config::ChatApiConfig;
use crate::error::ChatApiError;
use crate::events::StreamDelta;
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::reasoning::ReasoningSplitter;
use crate::sse::SseDecoder;
use crate::url::normalize_chat_url;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

/// Why a guarded await stopped before its future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupted {
    Cancelled,
    DeadlineElapsed,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let http = Client::builder().build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ChatApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config) {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Request body for one call; tool schemas are omitted when empty.
    pub fn chat_request(&self, messages: &[Message], tools: &[ToolSchema]) -> ChatRequest {
        ChatRequest::new(
            self.config.model.clone(),
            self.config.max_tokens,
            messages,
            tools,
        )
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers()?;
        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    /// Streams one completion, forwarding `(text, is_reasoning)` pairs to `on_token`.
    ///
    /// The configured timeout is an absolute deadline from request start.
    /// Cancellation is checked at every chunk read and surfaces as
    /// [`ChatApiError::Cancelled`] carrying the visible text assembled so far.
    pub async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        mut on_token: Option<&mut TokenSink<'_>>,
        cancellation: Option<&CancelSignal>,
    ) -> Result<LlmResponse, ChatApiError> {
        let deadline = Instant::now() + self.config.timeout;
        let request = self.chat_request(messages, tools);
        let mut assembler = ResponseAssembler::default();

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion request"
        );

        let send = self.build_request(&request)?.send();
        let response = match await_or_cancel(send, cancellation, deadline).await {
            Ok(response) => response?,
            Err(reason) => return Err(self.interrupted(reason, &assembler)),
        };
        let response = self.ensure_success(response, cancellation, deadline).await?;

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut splitter = ReasoningSplitter::decorated();

        loop {
            let next = match await_or_cancel(bytes.next(), cancellation, deadline).await {
                Ok(next) => next,
                Err(reason) => return Err(self.interrupted(reason, &assembler)),
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(ChatApiError::from)?;
            for delta in decoder.feed(&chunk) {
                route_delta(&delta, &mut splitter, &mut on_token);
                assembler.push(&delta);
            }
            if decoder.is_finished() {
                break;
            }
        }

        for delta in decoder.flush() {
            route_delta(&delta, &mut splitter, &mut on_token);
            assembler.push(&delta);
        }

        if is_cancelled(cancellation) {
            return Err(self.interrupted(Interrupted::Cancelled, &assembler));
        }

        if let Some(sink) = on_token.as_deref_mut() {
            splitter.finish(&mut |text: &str, reasoning: bool| sink(text, reasoning));
        }

        Ok(assembler.finish())
    }

    async fn ensure_success(
        &self,
        response: Response,
        cancellation: Option<&CancelSignal>,
        deadline: Instant,
    ) -> Result<Response, ChatApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match await_or_cancel(response.text(), cancellation, deadline).await {
            Ok(body) => body.unwrap_or_default(),
            Err(reason) => return Err(self.interrupted(reason, &ResponseAssembler::default())),
        };
        warn!(status = status.as_u16(), "chat completion request failed");
        Err(ChatApiError::Status(status, body))
    }

    fn interrupted(&self, reason: Interrupted, assembler: &ResponseAssembler) -> ChatApiError {
        match reason {
            Interrupted::Cancelled => {
                debug!("chat completion cancelled");
                ChatApiError::Cancelled {
                    partial: assembler.partial_text().to_owned(),
                }
            }
            Interrupted::DeadlineElapsed => {
                warn!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "chat completion timed out"
                );
                ChatApiError::Timeout(self.config.timeout)
            }
        }
    }
}

fn route_delta(
    delta: &StreamDelta,
    splitter: &mut ReasoningSplitter,
    on_token: &mut Option<&mut TokenSink<'_>>,
) {
    let Some(sink) = on_token.as_deref_mut() else {
        return;
    };

    match delta {
        StreamDelta::Content { text } => {
            splitter.push(text, &mut |span: &str, reasoning: bool| sink(span, reasoning));
        }
        StreamDelta::Reasoning { text } => sink(text, true),
        StreamDelta::ToolCall { .. } | StreamDelta::Done { .. } => {}
    }
}

fn is_cancelled(cancel: Option<&CancelSignal>) -> bool {
    cancel.is_some_and(signal_is_cancelled)
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancelSignal>,
    deadline: Instant,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(Interrupted::Cancelled);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Interrupted::DeadlineElapsed);
        }
        let remaining = deadline - now;
        let wait = if cancellation.is_some() {
            remaining.min(CANCEL_POLL_INTERVAL)
        } else {
            remaining
        };

        if let Ok(output) = tokio::time::timeout(wait, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(Interrupted::Cancelled);
            }
            return Ok(output);
        }
    }
}
