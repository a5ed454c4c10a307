//! Best-effort repair of near-JSON emitted by models.
//!
//! A single character pass that fixes the common slips: markdown fences,
//! single-quoted strings, unescaped quotes and raw control characters inside
//! strings, and trailing commas. Structure is never invented; unbalanced
//! braces stay unbalanced and fail the second parse.

/// Rewrite `input` into something `serde_json` is more likely to accept.
pub fn repair_json(input: &str) -> String {
    let stripped = strip_code_fences(input);
    let chars: Vec<char> = stripped.chars().collect();
    let mut out = String::with_capacity(stripped.len() + 8);
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    out.push('"');
                }
                ',' if matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) => {}
                _ => out.push(c),
            },
            Some(q) => match c {
                '\\' => {
                    match chars.get(i + 1) {
                        // `\'` is not a JSON escape
                        Some('\'') => out.push('\''),
                        Some(&next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push_str("\\\\"),
                    }
                    i += 1;
                }
                c if c == q => {
                    if closes_string(&chars, i + 1) {
                        quote = None;
                        out.push('"');
                    } else if q == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push('\'');
                    }
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            },
        }
        i += 1;
    }

    out
}

/// A quote closes its string when the next significant character is
/// structural or the input ends.
fn closes_string(chars: &[char], from: usize) -> bool {
    matches!(
        next_significant(chars, from),
        None | Some(',') | Some('}') | Some(']') | Some(':')
    )
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

fn strip_code_fences(input: &str) -> String {
    if !input.contains("```") {
        return input.to_string();
    }
    input
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn repaired(input: &str) -> Value {
        serde_json::from_str(&repair_json(input)).unwrap()
    }

    #[test]
    fn valid_json_is_untouched() {
        let input = r#"{"a": [1, 2], "b": {"c": "d\"e"}}"#;
        assert_eq!(repair_json(input), input);
    }

    #[test]
    fn drops_trailing_commas() {
        assert_eq!(repaired(r#"{"a": [1, 2,], "b": 3,}"#), json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn converts_single_quotes() {
        assert_eq!(
            repaired("{'path': 'src/it's.rs'}"),
            json!({"path": "src/it's.rs"})
        );
    }

    #[test]
    fn escapes_inner_quotes() {
        assert_eq!(
            repaired(r#"{"text": "say "hi" now"}"#),
            json!({"text": "say \"hi\" now"})
        );
    }

    #[test]
    fn escapes_raw_newlines_in_strings() {
        assert_eq!(
            repaired("{\"content\": \"line one\nline two\tend\"}"),
            json!({"content": "line one\nline two\tend"})
        );
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(
            repaired("```json\n{\"a\": 1}\n```"),
            json!({"a": 1})
        );
    }

    #[test]
    fn leaves_unbalanced_input_unbalanced() {
        let out = repair_json(r#"{"a": 1"#);
        assert!(serde_json::from_str::<Value>(&out).is_err());
    }
}
