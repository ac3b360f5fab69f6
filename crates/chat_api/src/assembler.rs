use std::collections::BTreeMap;

use agent_provider::{LlmResponse, ToolArguments, ToolCall};
use serde_json::Value;
use tracing::debug;

use crate::events::StreamDelta;
use crate::reasoning::ReasoningSplitter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds decoded deltas into one [`LlmResponse`].
///
/// Content passes through an undecorated [`ReasoningSplitter`] so inline
/// reasoning spans end up in `reasoning` rather than `content`.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    content: String,
    reasoning: String,
    splitter: ReasoningSplitter,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self {
            content: String::new(),
            reasoning: String::new(),
            splitter: ReasoningSplitter::undecorated(),
            tool_calls: BTreeMap::new(),
            finish_reason: None,
        }
    }
}

impl ResponseAssembler {
    pub fn push(&mut self, delta: &StreamDelta) {
        match delta {
            StreamDelta::Content { text } => {
                let Self {
                    content,
                    reasoning,
                    splitter,
                    ..
                } = self;
                splitter.push(text, &mut |span, is_reasoning| {
                    if is_reasoning {
                        reasoning.push_str(span);
                    } else {
                        content.push_str(span);
                    }
                });
            }
            StreamDelta::Reasoning { text } => self.reasoning.push_str(text),
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let entry = self.tool_calls.entry(*index).or_default();
                if let Some(id) = id.as_deref().filter(|id| !id.is_empty()) {
                    entry.id = Some(id.to_owned());
                }
                if let Some(name) = name {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = arguments {
                    entry.arguments.push_str(arguments);
                }
            }
            StreamDelta::Done { finish_reason } => {
                self.finish_reason = Some(finish_reason.clone());
            }
        }
    }

    /// Visible text assembled so far; attached to cancellation outcomes.
    pub fn partial_text(&self) -> &str {
        &self.content
    }

    pub fn finish(mut self) -> LlmResponse {
        let Self {
            content,
            reasoning,
            splitter,
            ..
        } = &mut self;
        splitter.finish(&mut |span, is_reasoning| {
            if is_reasoning {
                reasoning.push_str(span);
            } else {
                content.push_str(span);
            }
        });

        let tool_calls: Vec<ToolCall> = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|(index, partial)| ToolCall {
                id: partial.id.unwrap_or_else(|| format!("call_{index}")),
                arguments: parse_arguments(&partial.name, &partial.arguments),
                name: partial.name,
            })
            .collect();

        let content = if self.content.is_empty() && tool_calls.is_empty() {
            None
        } else {
            Some(self.content)
        };
        let reasoning = Some(self.reasoning).filter(|text| !text.is_empty());

        LlmResponse {
            content,
            reasoning,
            tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

/// Lenient argument parsing: anything but a JSON object becomes an empty map.
pub fn parse_arguments(tool_name: &str, raw: &str) -> ToolArguments {
    if raw.trim().is_empty() {
        return ToolArguments::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(
                tool = tool_name,
                kind = ?other,
                "tool arguments are not an object; using empty map"
            );
            ToolArguments::new()
        }
        Err(error) => {
            debug!(tool = tool_name, %error, "tool arguments are not valid JSON; using empty map");
            ToolArguments::new()
        }
    }
}
