/// Typed delta decoded from one server-sent-event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Visible content fragment; may still contain inline reasoning markers.
    Content { text: String },
    /// Reasoning fragment delivered through a dedicated field.
    Reasoning { text: String },
    /// Partial tool call keyed by its upstream index.
    ToolCall {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// Upstream finish reason (`stop`, `tool_calls`, `length`, ...).
    Done { finish_reason: String },
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn tool_call(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Self {
        Self::ToolCall {
            index,
            id: id.map(ToString::to_string),
            name: name.map(ToString::to_string),
            arguments: arguments.map(ToString::to_string),
        }
    }
}
