//! Incremental splitter separating inline reasoning spans from visible content.
//!
//! Content fragments may carry `<think>` … `</think>` spans. Markers can be split
//! across fragments, so the splitter holds back the longest suffix that could
//! still grow into the marker it is waiting for. Each call is a single
//! left-to-right scan; nothing older than one marker length is ever rescanned.

/// Marker opening a reasoning span.
pub const REASONING_OPEN: &str = "<think>";
/// Marker closing a reasoning span.
pub const REASONING_CLOSE: &str = "</think>";
/// Emitted once, flagged as reasoning, when a span opens on a decorated splitter.
pub const THINKING_BANNER: &str = "[thinking] ";
/// Emitted, flagged as reasoning, when a span closes on a decorated splitter.
pub const THINKING_BOUNDARY: &str = "\n";

#[derive(Debug, Clone)]
pub struct ReasoningSplitter {
    in_reasoning: bool,
    pending: String,
    decorated: bool,
}

impl Default for ReasoningSplitter {
    fn default() -> Self {
        Self::decorated()
    }
}

impl ReasoningSplitter {
    /// Splitter for live display: emits the banner and boundary tokens.
    pub fn decorated() -> Self {
        Self {
            in_reasoning: false,
            pending: String::new(),
            decorated: true,
        }
    }

    /// Splitter whose emitted text concatenates back to the marker-free input.
    pub fn undecorated() -> Self {
        Self {
            decorated: false,
            ..Self::decorated()
        }
    }

    pub fn is_in_reasoning(&self) -> bool {
        self.in_reasoning
    }

    /// Scan one fragment and emit `(text, is_reasoning)` spans.
    pub fn push(&mut self, fragment: &str, emit: &mut dyn FnMut(&str, bool)) {
        let text = if self.pending.is_empty() {
            fragment.to_owned()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.push_str(fragment);
            joined
        };

        let mut pos = 0;
        while pos < text.len() {
            let marker = self.awaited_marker();
            let rest = &text[pos..];

            if let Some(found) = rest.find(marker) {
                if found > 0 {
                    emit(&rest[..found], self.in_reasoning);
                }
                self.toggle(emit);
                pos += found + marker.len();
                continue;
            }

            let held = partial_marker_suffix(rest, marker);
            let visible = &rest[..rest.len() - held];
            if !visible.is_empty() {
                emit(visible, self.in_reasoning);
            }
            self.pending.push_str(&rest[rest.len() - held..]);
            break;
        }
    }

    /// Flush a held partial marker as text of the current mode.
    ///
    /// An unterminated reasoning span stays open; no boundary token is emitted.
    pub fn finish(&mut self, emit: &mut dyn FnMut(&str, bool)) {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            emit(&pending, self.in_reasoning);
        }
    }

    fn awaited_marker(&self) -> &'static str {
        if self.in_reasoning {
            REASONING_CLOSE
        } else {
            REASONING_OPEN
        }
    }

    fn toggle(&mut self, emit: &mut dyn FnMut(&str, bool)) {
        if self.in_reasoning {
            if self.decorated {
                emit(THINKING_BOUNDARY, true);
            }
            self.in_reasoning = false;
        } else {
            self.in_reasoning = true;
            if self.decorated {
                emit(THINKING_BANNER, true);
            }
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn partial_marker_suffix(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| text.ends_with(&marker[..len]))
        .unwrap_or(0)
}
