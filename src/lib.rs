//! Shared runtime plumbing for the agentloop workspace.
//!
//! The agent itself lives in the workspace crates:
//! - `agent_provider`: conversation types, cancellation signal and the
//!   `ChatModel` seam
//! - `chat_api`: streaming transport for OpenAI-compatible endpoints
//! - `coding_agent`: tool registry, turn loop and the `coding-agent` binary
//!
//! This crate only carries what every binary needs at startup: environment
//! configuration and `tracing` subscriber setup.

pub mod config;
pub mod logging;

pub use config::EnvConfig;
