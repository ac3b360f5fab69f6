use serde_json::Value;
use tracing::debug;

use crate::events::StreamDelta;

/// Payload of the terminal sentinel record.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Incremental decoder for newline-delimited SSE records.
///
/// Bytes are buffered until a full line is available, so records and
/// multi-byte characters may split across chunks freely.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete records.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamDelta> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.finished {
                continue;
            }
            self.decode_line(&line[..newline], &mut deltas);
        }

        if self.finished {
            self.buffer.clear();
        }

        deltas
    }

    /// Decode a trailing record that arrived without a final newline.
    pub fn flush(&mut self) -> Vec<StreamDelta> {
        let line = std::mem::take(&mut self.buffer);
        let mut deltas = Vec::new();
        if !self.finished && !line.is_empty() {
            self.decode_line(&line, &mut deltas);
        }
        deltas
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_records(input: &str) -> Vec<StreamDelta> {
        let mut decoder = Self::default();
        let mut deltas = decoder.feed(input.as_bytes());
        deltas.extend(decoder.flush());
        deltas
    }

    /// True once the terminal sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    fn decode_line(&mut self, raw: &[u8], deltas: &mut Vec<StreamDelta>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => map_record(&value, deltas),
            Err(error) => debug!(%error, "skipping malformed SSE record"),
        }
    }
}

fn map_record(value: &Value, deltas: &mut Vec<StreamDelta>) {
    let Some(choices) = value.get("choices").and_then(Value::as_array) else {
        return;
    };

    for choice in choices {
        if let Some(delta) = choice.get("delta") {
            map_delta(delta, deltas);
        }

        if let Some(reason) = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
        {
            deltas.push(StreamDelta::Done {
                finish_reason: reason.to_owned(),
            });
        }
    }
}

fn map_delta(delta: &Value, deltas: &mut Vec<StreamDelta>) {
    let reasoning = delta
        .get("reasoning_content")
        .or_else(|| delta.get("reasoning"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty());
    if let Some(text) = reasoning {
        deltas.push(StreamDelta::Reasoning {
            text: text.to_owned(),
        });
    }

    if let Some(text) = delta
        .get("content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
    {
        deltas.push(StreamDelta::content(text));
    }

    let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) else {
        return;
    };

    for (position, call) in tool_calls.iter().enumerate() {
        let index = call
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|index| u32::try_from(index).ok())
            .unwrap_or(position as u32);
        let function = call.get("function");
        deltas.push(StreamDelta::tool_call(
            index,
            call.get("id").and_then(Value::as_str),
            function
                .and_then(|function| function.get("name"))
                .and_then(Value::as_str),
            function
                .and_then(|function| function.get("arguments"))
                .and_then(Value::as_str),
        ));
    }
}
