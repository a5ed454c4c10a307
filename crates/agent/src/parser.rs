//! Tool-use block parsing and formatting.
//!
//! The model requests a tool by embedding one block in its reply:
//!
//! ```text
//! <use_tool>
//!   <tool_name>read</tool_name>
//!   <arguments>
//!     {"path": "src/main.rs"}
//!   </arguments>
//! </use_tool>
//! ```
//!
//! Only the first block of a message is honoured. The arguments region ends
//! at the first `</arguments>` that is followed (after whitespace) by
//! `</use_tool>`, so argument strings may mention either tag.

use codeloop_core::error::ProtocolError;
use codeloop_core::tool::{ToolInvocationRequest, ToolResult};
use serde_json::{Map, Value};
use tracing::warn;

use crate::repair::repair_json;

pub const USE_TOOL_OPEN: &str = "<use_tool>";
pub const USE_TOOL_CLOSE: &str = "</use_tool>";
pub const TOOL_NAME_OPEN: &str = "<tool_name>";
pub const TOOL_NAME_CLOSE: &str = "</tool_name>";
pub const ARGUMENTS_OPEN: &str = "<arguments>";
pub const ARGUMENTS_CLOSE: &str = "</arguments>";

/// A model reply split into prose and (at most) one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    /// The reply with the honoured block removed, trimmed
    pub cleaned_message: String,

    /// The requested invocation, if the reply contained a block
    pub invocation: Option<ToolInvocationRequest>,

    /// Whether the arguments only parsed after repair
    pub repaired: bool,
}

impl ParsedOutput {
    fn plain(text: &str) -> Self {
        Self {
            cleaned_message: text.trim().to_string(),
            invocation: None,
            repaired: false,
        }
    }
}

/// Parse a model reply.
///
/// Text without a `<use_tool>` block parses to `invocation: None`. A block
/// that is unterminated, lacks a tool name, or carries arguments that are
/// not a JSON object (even after repair) is a [`ProtocolError`].
pub fn parse(text: &str) -> Result<ParsedOutput, ProtocolError> {
    let Some(start) = text.find(USE_TOOL_OPEN) else {
        return Ok(ParsedOutput::plain(text));
    };

    let body_start = start + USE_TOOL_OPEN.len();
    let rest = &text[body_start..];

    let first_close = rest
        .find(USE_TOOL_CLOSE)
        .ok_or_else(|| malformed("unterminated <use_tool> block"))?;

    let (header, raw_arguments, block_len) = match rest[..first_close].find(ARGUMENTS_OPEN) {
        None => (&rest[..first_close], None, first_close + USE_TOOL_CLOSE.len()),
        Some(args_open) => {
            let args_start = args_open + ARGUMENTS_OPEN.len();
            let (args_len, tail_len) = find_arguments_end(&rest[args_start..])
                .ok_or_else(|| malformed("unterminated <arguments> section"))?;
            (
                &rest[..args_open],
                Some(&rest[args_start..args_start + args_len]),
                args_start + tail_len,
            )
        }
    };

    let tool_name = extract_tool_name(header)?;
    let (arguments, repaired) = match raw_arguments {
        Some(raw) => parse_arguments(raw)?,
        None => (Map::new(), false),
    };

    if rest[block_len..].contains(USE_TOOL_OPEN) {
        warn!(tool = %tool_name, "Reply contains more than one tool-use block; only the first is executed");
    }

    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..start]);
    cleaned.push_str(&rest[block_len..]);

    Ok(ParsedOutput {
        cleaned_message: cleaned.trim().to_string(),
        invocation: Some(ToolInvocationRequest::new(tool_name, arguments)),
        repaired,
    })
}

/// Locate the end of the arguments region.
///
/// Returns `(arguments_len, consumed_len)` where `consumed_len` also covers
/// `</arguments>`, the whitespace after it and `</use_tool>`.
fn find_arguments_end(s: &str) -> Option<(usize, usize)> {
    for (idx, _) in s.match_indices(ARGUMENTS_CLOSE) {
        let after = &s[idx + ARGUMENTS_CLOSE.len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with(USE_TOOL_CLOSE) {
            let gap = after.len() - trimmed.len();
            return Some((idx, idx + ARGUMENTS_CLOSE.len() + gap + USE_TOOL_CLOSE.len()));
        }
    }
    None
}

fn extract_tool_name(header: &str) -> Result<String, ProtocolError> {
    let open = header
        .find(TOOL_NAME_OPEN)
        .ok_or_else(|| malformed("missing <tool_name>"))?;
    let name_start = open + TOOL_NAME_OPEN.len();
    let close = header[name_start..]
        .find(TOOL_NAME_CLOSE)
        .ok_or_else(|| malformed("unterminated <tool_name>"))?;

    let name = header[name_start..name_start + close].trim();
    if name.is_empty() {
        return Err(malformed("empty tool name"));
    }
    Ok(name.to_string())
}

/// Strict parse first; on failure, one repair pass and a second attempt.
fn parse_arguments(raw: &str) -> Result<(Map<String, Value>, bool), ProtocolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok((Map::new(), false));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok((into_object(value)?, false)),
        Err(strict_err) => {
            let repaired = repair_json(trimmed);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    warn!(error = %strict_err, "Tool arguments were not valid JSON; repaired");
                    Ok((into_object(value)?, true))
                }
                Err(_) => Err(malformed(format!(
                    "arguments are not valid JSON: {strict_err}"
                ))),
            }
        }
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, ProtocolError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(malformed(format!(
            "arguments must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedToolUse(reason.into())
}

/// Render an invocation in the exact block format the parser accepts.
///
/// `<` only occurs inside JSON strings, so it is written as `\u003c`; argument
/// text can then never close the block early.
pub fn format_tool_use(tool_name: &str, arguments: &Map<String, Value>) -> String {
    let json = Value::Object(arguments.clone()).to_string().replace('<', "\\u003c");
    format!(
        "{USE_TOOL_OPEN}\n  {TOOL_NAME_OPEN}{tool_name}{TOOL_NAME_CLOSE}\n  {ARGUMENTS_OPEN}\n    {json}\n  {ARGUMENTS_CLOSE}\n{USE_TOOL_CLOSE}"
    )
}

/// Frame a tool result as the user message appended after an invocation.
pub fn format_tool_result(tool_name: &str, result: &ToolResult) -> String {
    format!(
        "<tool_result name=\"{tool_name}\">\n{}\n</tool_result>",
        result.to_text()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn plain_text_has_no_invocation() {
        let parsed = parse("  All done, nothing to run.\n").unwrap();
        assert!(parsed.invocation.is_none());
        assert_eq!(parsed.cleaned_message, "All done, nothing to run.");
        assert!(!parsed.repaired);
    }

    #[test]
    fn formatted_invocation_parses_back() {
        let cases = [
            ("read", json!({})),
            (
                "read",
                json!({
                    "path": "src/lib.rs",
                    "offset": 10,
                    "nested": {"flags": [true, false, null], "ratio": 0.25},
                    "text": "quotes \" and\nnewlines"
                }),
            ),
            ("write", json!({"path": "docs/\u{e9}t\u{e9}.md", "content": "\u{65e5}\u{672c}\u{8a9e} \u{1f980}"})),
            ("edit", json!({"levels": [[[[[1, [2, [3, []]]]]]]], "empty": {"inner": {}}})),
            ("bash", json!({"command": "echo '<tool_name>ls</tool_name>' && echo <use_tool>"})),
            ("write", json!({"content": "</arguments>\n</use_tool>\n<use_tool>"})),
            ("grep", json!({"pattern": "\\d+\\s*</arguments>", "max": -3})),
        ];

        for (name, value) in cases {
            let args = object(value);
            let parsed = parse(&format_tool_use(name, &args)).unwrap();
            let invocation = parsed.invocation.unwrap();
            assert_eq!(invocation.tool_name, name);
            assert_eq!(invocation.arguments, args, "arguments for {name}");
            assert_eq!(parsed.cleaned_message, "");
            assert!(!parsed.repaired);
        }
    }

    #[test]
    fn prose_around_block_is_kept() {
        let text = format!(
            "Let me look.\n{}\nBe right back.",
            format_tool_use("ls", &Map::new())
        );
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.invocation.unwrap().tool_name, "ls");
        assert_eq!(parsed.cleaned_message, "Let me look.\n\nBe right back.");
    }

    #[test]
    fn trailing_comma_is_repaired() {
        let text = "<use_tool>\n<tool_name>echo</tool_name>\n<arguments>\n{\"text\": \"hi\",}\n</arguments>\n</use_tool>";
        let parsed = parse(text).unwrap();
        assert!(parsed.repaired);
        assert_eq!(
            parsed.invocation.unwrap().arguments,
            object(json!({"text": "hi"}))
        );
    }

    #[test]
    fn unbalanced_braces_are_malformed() {
        let text = "<use_tool><tool_name>echo</tool_name><arguments>{\"text\": \"hi\"</arguments></use_tool>";
        assert!(matches!(
            parse(text),
            Err(ProtocolError::MalformedToolUse(_))
        ));
    }

    #[test]
    fn closing_tags_inside_argument_strings() {
        let args = object(json!({"content": "write </arguments> then </use_tool> literally"}));
        let parsed = parse(&format_tool_use("write", &args)).unwrap();
        assert_eq!(parsed.invocation.unwrap().arguments, args);
    }

    #[test]
    fn only_first_block_is_honoured() {
        let first = format_tool_use("ls", &Map::new());
        let second = format_tool_use("read", &object(json!({"path": "a.txt"})));
        let parsed = parse(&format!("{first}\n{second}")).unwrap();
        assert_eq!(parsed.invocation.unwrap().tool_name, "ls");
        assert!(parsed.cleaned_message.contains("<tool_name>read</tool_name>"));
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        let parsed = parse("<use_tool><tool_name>ls</tool_name></use_tool>").unwrap();
        let invocation = parsed.invocation.unwrap();
        assert_eq!(invocation.tool_name, "ls");
        assert!(invocation.arguments.is_empty());
    }

    #[test]
    fn whitespace_arguments_are_empty_object() {
        let parsed =
            parse("<use_tool><tool_name>ls</tool_name><arguments>\n  \n</arguments></use_tool>")
                .unwrap();
        assert!(parsed.invocation.unwrap().arguments.is_empty());
    }

    #[test]
    fn missing_or_empty_tool_name_is_malformed() {
        assert!(parse("<use_tool><arguments>{}</arguments></use_tool>").is_err());
        assert!(parse("<use_tool><tool_name>  </tool_name></use_tool>").is_err());
    }

    #[test]
    fn unterminated_block_is_malformed() {
        let err = parse("<use_tool><tool_name>ls</tool_name><arguments>{}").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let err =
            parse("<use_tool><tool_name>ls</tool_name><arguments>[1, 2]</arguments></use_tool>")
                .unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn tool_result_framing() {
        let framed = format_tool_result("ls", &ToolResult::Text("a.txt\nb.txt".into()));
        assert_eq!(framed, "<tool_result name=\"ls\">\na.txt\nb.txt\n</tool_result>");
    }
}
