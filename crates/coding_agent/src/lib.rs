//! Local coding agent: tool registry, turn loop and a line-oriented REPL.
//!
//! ## Provider bootstrap
//!
//! `CODING_AGENT_PROVIDER` selects the model backend:
//!
//! - `chat-api` (default) streams from an OpenAI-compatible
//!   `/chat/completions` endpoint
//! - `mock` answers from a deterministic script, for offline runs and tests
//!
//! ## Configuration
//!
//! `CODING_AGENT_CONFIG_PATH` may point at a UTF-8 JSON file:
//!
//! ```json
//! {
//!   "base_url": "https://api.openai.com/v1",
//!   "api_key": "sk-...",
//!   "model": "gpt-4o-mini",
//!   "max_tokens": 4096,
//!   "timeout_sec": 120,
//!   "max_turns": 10,
//!   "permission": "write-only",
//!   "system_prompt": "You are ..."
//! }
//! ```
//!
//! Every field is optional. Unknown fields are rejected, and numeric fields
//! must be > 0. `CODING_AGENT_API_KEY`, `CODING_AGENT_BASE_URL` and
//! `CODING_AGENT_MODEL` override the file. `CODING_AGENT_SYSTEM_PROMPT`
//! replaces the base system prompt; the tool inventory and saved learnings
//! from `.agent/memory.md` are appended before every request.
//!
//! ## Permissions
//!
//! Each tool belongs to a `read`, `write` or `none` group. Under `write-only`
//! only write tools ask for confirmation, under `read-and-write` read tools
//! ask too, and `auto-accept` never asks. A gated call runs only after an
//! explicit approval.
//!
//! Conversation contract: `Agent::ask` only appends to the conversation it is
//! given, and every assistant tool call is answered by exactly one tool
//! message before the next model request.

pub mod agent;
pub mod commands;
pub mod config;
pub mod prompt;
pub mod providers;
pub mod repl;
pub mod tools;
