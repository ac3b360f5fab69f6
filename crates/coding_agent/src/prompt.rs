//! System prompt assembly.

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a careful coding agent working inside the user's project directory. Follow user requests exactly, inspect files before changing them, and say so plainly when a constraint cannot be satisfied.";

pub const SYSTEM_PROMPT_ENV_VAR: &str = "CODING_AGENT_SYSTEM_PROMPT";

const TOOL_POLICY: &str = "Use tools when they help answer the request. Call them with JSON arguments matching their schema, and read a tool's result before deciding the next step. Some tools may require user approval; if a call is declined, do not retry it unchanged.";

const LEARNINGS_HEADING: &str = "## Saved learnings";

/// Builds the system message for one session.
///
/// A blank `base` falls back to [`DEFAULT_SYSTEM_PROMPT`]. `memory` is the raw
/// journal text and is spliced in verbatim when non-empty.
pub fn build_system_prompt(base: &str, tool_names: &[String], memory: &str) -> String {
    let base = base.trim();
    let mut prompt = if base.is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        base.to_string()
    };

    if !tool_names.is_empty() {
        prompt.push_str("\n\n## Tools\n");
        prompt.push_str(TOOL_POLICY);
        prompt.push_str("\nAvailable tools: ");
        prompt.push_str(&tool_names.join(", "));
        prompt.push('.');
    }

    let memory = memory.trim_end();
    if !memory.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(LEARNINGS_HEADING);
        prompt.push('\n');
        prompt.push_str(memory);
    }

    prompt
}

/// Trimmed override from [`SYSTEM_PROMPT_ENV_VAR`], if set and non-blank.
pub fn system_prompt_from_env() -> Option<String> {
    sanitize_override(std::env::var(SYSTEM_PROMPT_ENV_VAR).ok())
}

fn sanitize_override(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
