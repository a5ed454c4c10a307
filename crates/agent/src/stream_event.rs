//! Run events and the streaming echo filter.
//!
//! `AgentStreamEvent` is what an embedding application observes while a
//! run is in flight: prose chunks as they stream, tool calls and their
//! results, and a final summary.

use codeloop_core::model::Usage;
use serde::{Deserialize, Serialize};

use crate::parser::USE_TOOL_OPEN;

/// Events emitted by the query loop.
///
/// - `chunk`: prose streamed from the model (tool-use markup removed)
/// - `tool_call`: the loop is about to invoke a tool
/// - `tool_result`: the invocation finished
/// - `done`: the run produced its final answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// The loop is calling a tool.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        name: String,
        output: String,
        success: bool,
    },

    /// The run is complete.
    Done {
        run_id: String,
        rounds: u32,
        usage: Option<Usage>,
    },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
        }
    }
}

/// Decides which streamed text is safe to echo.
///
/// Text is released as it arrives until a `<use_tool>` tag shows up; from
/// then on nothing more is echoed for the current generation. A trailing
/// fragment that could be the start of the tag is held back until the next
/// chunk settles it.
#[derive(Debug, Default)]
pub struct EchoFilter {
    buffer: String,
    emitted: usize,
    suppressed: bool,
}

impl EchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the text that may be echoed now.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        if self.suppressed {
            return None;
        }

        let pending = &self.buffer[self.emitted..];
        if let Some(pos) = pending.find(USE_TOOL_OPEN) {
            let out = pending[..pos].to_string();
            self.suppressed = true;
            self.emitted = self.buffer.len();
            return non_empty(out);
        }

        let release = pending.len() - partial_tag_len(pending);
        let out = pending[..release].to_string();
        self.emitted += release;
        non_empty(out)
    }

    /// End of stream: release anything held back.
    pub fn finish(&mut self) -> Option<String> {
        if self.suppressed {
            return None;
        }
        let out = self.buffer[self.emitted..].to_string();
        self.emitted = self.buffer.len();
        non_empty(out)
    }

    /// Whether a tool-use tag was seen.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Everything pushed so far, echoed or not.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn into_text(self) -> String {
        self.buffer
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the tag.
fn partial_tag_len(text: &str) -> usize {
    (1..USE_TOOL_OPEN.len())
        .rev()
        .find(|&k| text.ends_with(&USE_TOOL_OPEN[..k]))
        .unwrap_or(0)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
