//! Chat-completions-backed implementation of the shared `agent_provider` contract.
//!
//! This adapter forwards one completion call to `chat_api` and folds its
//! transport errors into `ProviderError` for `coding_agent`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{
    is_cancelled, CancelSignal, ChatModel, LlmResponse, Message, ProviderError,
    ProviderInitError, ProviderProfile, TokenSink, ToolSchema,
};
use async_trait::async_trait;
use chat_api::{ChatApiClient, ChatApiConfig, ChatApiError};
use tracing::{debug, warn};

/// Stable provider identifier used by `coding_agent` startup selection.
pub const CHAT_API_PROVIDER_ID: &str = "chat-api";

/// Model used when the configured identifier is blank.
pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";

/// Runtime configuration for the chat-completions provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatApiProviderConfig {
    pub api_key: Option<String>,
    pub model_id: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl ChatApiProviderConfig {
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model_id: model_id.into(),
            base_url: None,
            max_tokens: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(sanitize_model_id(&self.model_id));

        if let Some(api_key) = self.api_key {
            config = config.with_api_key(api_key);
        }

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

#[async_trait]
trait StreamClient: Send + Sync {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        on_token: Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<LlmResponse, ChatApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ChatApiClient,
}

#[async_trait]
impl StreamClient for DefaultStreamClient {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        on_token: Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<LlmResponse, ChatApiError> {
        self.client
            .stream(messages, tools, on_token, Some(cancel))
            .await
    }
}

/// `ChatModel` adapter backed by `chat_api` transport primitives.
pub struct ChatApiProvider {
    model_id: String,
    calls: Mutex<u64>,
    stream_client: Arc<dyn StreamClient>,
}

impl ChatApiProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: ChatApiProviderConfig) -> Result<Self, ProviderInitError> {
        let model_id = sanitize_model_id(&config.model_id);
        let stream_client = Arc::new(DefaultStreamClient {
            client: ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model_id,
            calls: Mutex::new(0),
            stream_client,
        })
    }

    /// Number of completion calls issued so far.
    pub fn call_count(&self) -> u64 {
        *lock_unpoisoned(&self.calls)
    }

    fn next_call_number(&self) -> u64 {
        let mut calls = lock_unpoisoned(&self.calls);
        *calls += 1;
        *calls
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(model_id: &str, stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model_id: sanitize_model_id(model_id),
            calls: Mutex::new(0),
            stream_client,
        }
    }
}

#[async_trait]
impl ChatModel for ChatApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: CHAT_API_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        on_token: Option<&mut TokenSink<'_>>,
        cancel: &CancelSignal,
    ) -> Result<LlmResponse, ProviderError> {
        if is_cancelled(cancel) {
            return Err(ProviderError::Cancelled {
                partial: String::new(),
            });
        }

        let call = self.next_call_number();
        debug!(call, model = %self.model_id, "starting completion");

        match self
            .stream_client
            .stream(messages, tools, on_token, cancel)
            .await
        {
            Ok(response) => {
                debug!(
                    call,
                    tool_calls = response.tool_calls.len(),
                    finish_reason = response.finish_reason.as_deref().unwrap_or(""),
                    "completion finished"
                );
                Ok(response)
            }
            Err(error) if error.is_cancelled() => {
                debug!(call, "completion cancelled");
                Err(error.into())
            }
            Err(error) => {
                warn!(call, %error, "completion failed");
                Err(error.into())
            }
        }
    }
}

fn sanitize_model_id(model_id: &str) -> String {
    let trimmed = model_id.trim();
    if trimmed.is_empty() {
        DEFAULT_MODEL_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize chat-api provider: {error}"))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use agent_provider::{cancel, new_cancel_signal, ToolArguments, ToolCall};
    use serde_json::json;

    use super::*;

    enum FakeStreamOutcome {
        Success {
            tokens: Vec<(&'static str, bool)>,
            response: LlmResponse,
        },
        Error(ChatApiError),
    }

    struct FakeStreamClient {
        observed: Mutex<Option<(usize, usize)>>,
        outcome: Mutex<Option<FakeStreamOutcome>>,
    }

    impl FakeStreamClient {
        fn success(tokens: Vec<(&'static str, bool)>, response: LlmResponse) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Success { tokens, response })),
            })
        }

        fn failure(error: ChatApiError) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Error(error))),
            })
        }

        fn observed(&self) -> Option<(usize, usize)> {
            *lock_unpoisoned(&self.observed)
        }
    }

    #[async_trait]
    impl StreamClient for FakeStreamClient {
        async fn stream(
            &self,
            messages: &[Message],
            tools: &[ToolSchema],
            on_token: Option<&mut TokenSink<'_>>,
            _cancel: &CancelSignal,
        ) -> Result<LlmResponse, ChatApiError> {
            *lock_unpoisoned(&self.observed) = Some((messages.len(), tools.len()));

            let outcome = lock_unpoisoned(&self.outcome).take();
            match outcome {
                Some(FakeStreamOutcome::Success { tokens, response }) => {
                    if let Some(sink) = on_token {
                        for (text, reasoning) in tokens {
                            sink(text, reasoning);
                        }
                    }
                    Ok(response)
                }
                Some(FakeStreamOutcome::Error(error)) => Err(error),
                None => panic!("fake stream outcome should be consumed exactly once"),
            }
        }
    }

    fn schema() -> ToolSchema {
        ToolSchema {
            name: "list_directory".to_string(),
            description: "List a directory".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[tokio::test]
    async fn profile_reports_chat_api_provider_id_and_model() {
        let stream = FakeStreamClient::success(Vec::new(), LlmResponse::text("ok"));
        let provider = ChatApiProvider::with_stream_client_for_tests(" local-model ", stream);

        let profile = provider.profile();
        assert_eq!(profile.provider_id, CHAT_API_PROVIDER_ID);
        assert_eq!(profile.model_id, "local-model");
    }

    #[tokio::test]
    async fn blank_model_defaults_to_fallback_model() {
        let stream = FakeStreamClient::success(Vec::new(), LlmResponse::text("ok"));
        let provider = ChatApiProvider::with_stream_client_for_tests("  ", stream);

        assert_eq!(provider.profile().model_id, DEFAULT_MODEL_ID);
    }

    #[tokio::test]
    async fn complete_forwards_tokens_and_returns_response() {
        let call = ToolCall::new("call_0", "list_directory", ToolArguments::new());
        let stream = FakeStreamClient::success(
            vec![("[thinking] ", true), ("hm", true), ("Hi", false)],
            LlmResponse::tool_calls(vec![call.clone()]),
        );
        let provider = ChatApiProvider::with_stream_client_for_tests(
            "m",
            Arc::clone(&stream) as Arc<dyn StreamClient>,
        );

        let signal = new_cancel_signal();
        let mut seen = Vec::new();
        let mut sink = |text: &str, reasoning: bool| seen.push((text.to_string(), reasoning));
        let response = provider
            .complete(
                &[Message::system("s"), Message::user("u")],
                &[schema()],
                Some(&mut sink),
                &signal,
            )
            .await
            .expect("completion should succeed");

        assert_eq!(response.tool_calls, vec![call]);
        assert_eq!(stream.observed(), Some((2, 1)));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            seen,
            vec![
                ("[thinking] ".to_string(), true),
                ("hm".to_string(), true),
                ("Hi".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn complete_maps_transport_cancellation_with_partial_text() {
        let stream = FakeStreamClient::failure(ChatApiError::Cancelled {
            partial: "Hel".to_string(),
        });
        let provider = ChatApiProvider::with_stream_client_for_tests("m", stream);

        let error = provider
            .complete(&[Message::user("u")], &[], None, &new_cancel_signal())
            .await
            .expect_err("cancelled transport should fail");

        assert_eq!(
            error,
            ProviderError::Cancelled {
                partial: "Hel".to_string()
            }
        );
    }

    #[tokio::test]
    async fn complete_maps_timeout_and_unknown_errors() {
        let timeout = FakeStreamClient::failure(ChatApiError::Timeout(Duration::from_secs(2)));
        let provider = ChatApiProvider::with_stream_client_for_tests("m", timeout);
        let error = provider
            .complete(&[Message::user("u")], &[], None, &new_cancel_signal())
            .await
            .expect_err("timeout should fail");
        assert_eq!(error, ProviderError::Timeout(Duration::from_secs(2)));

        let unknown = FakeStreamClient::failure(ChatApiError::Unknown("boom".to_string()));
        let provider = ChatApiProvider::with_stream_client_for_tests("m", unknown);
        let error = provider
            .complete(&[Message::user("u")], &[], None, &new_cancel_signal())
            .await
            .expect_err("transport failure should fail");
        assert_eq!(error, ProviderError::Transport("boom".to_string()));
    }

    #[tokio::test]
    async fn complete_short_circuits_when_already_cancelled() {
        let stream = FakeStreamClient::success(Vec::new(), LlmResponse::text("never"));
        let provider = ChatApiProvider::with_stream_client_for_tests(
            "m",
            Arc::clone(&stream) as Arc<dyn StreamClient>,
        );
        let signal = new_cancel_signal();
        cancel(&signal);

        let error = provider
            .complete(&[Message::user("u")], &[], None, &signal)
            .await
            .expect_err("pre-cancelled call should fail");

        assert!(error.is_cancelled());
        assert_eq!(stream.observed(), None);
        assert_eq!(provider.call_count(), 0);
    }
}
