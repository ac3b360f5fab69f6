//! Transport-only chat-completions client primitives.
//!
//! This crate owns request building, server-sent-event decoding, reasoning
//! span splitting, and response assembly for OpenAI-compatible
//! `/chat/completions` streaming endpoints. It contains no tool execution and
//! no turn orchestration.
//!
//! Data flow for one call: [`ChatApiClient`] posts a [`ChatRequest`], feeds
//! body chunks to [`SseDecoder`], routes content fragments through
//! [`ReasoningSplitter`] for the live token callback, and folds every
//! [`StreamDelta`] into a [`ResponseAssembler`].

pub mod assembler;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod reasoning;
pub mod sse;
pub mod url;

pub use assembler::ResponseAssembler;
pub use client::ChatApiClient;
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::StreamDelta;
pub use payload::ChatRequest;
pub use reasoning::{ReasoningSplitter, REASONING_CLOSE, REASONING_OPEN};
pub use sse::SseDecoder;
pub use url::normalize_chat_url;
