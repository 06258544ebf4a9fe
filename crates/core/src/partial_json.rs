//! Partial JSON Accumulation
//!
//! Structured model output arrives as a stream of arbitrary text fragments.
//! [`PartialJsonAccumulator`] concatenates them per step and, after every
//! fragment, tries a lenient parse that closes any open string, array or
//! object so that fields such as `script` can be shown while the response is
//! still being generated.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Top-level fields resolvable from a partially received JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFields(Map<String, Value>);

impl PartialFields {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The latest full value of the `script` field, if it is a string yet.
    pub fn script(&self) -> Option<&str> {
        self.0.get("script").and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Per-step raw buffers of a streamed structured response.
#[derive(Debug, Default)]
pub struct PartialJsonAccumulator {
    buffers: HashMap<u64, String>,
}

impl PartialJsonAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `fragment` to the buffer of `step` and returns whatever
    /// top-level fields are decodable so far.
    ///
    /// Empty fragments are ignored. `None` means the buffer is not yet a
    /// prefix of a JSON object; the next fragment simply retries.
    pub fn append(&mut self, step: u64, fragment: &str) -> Option<PartialFields> {
        if fragment.is_empty() {
            return None;
        }
        let buffer = self.buffers.entry(step).or_default();
        buffer.push_str(fragment);
        match parse_partial_json(buffer)? {
            Value::Object(fields) => Some(PartialFields(fields)),
            _ => None,
        }
    }

    /// The raw text accumulated for `step` so far.
    pub fn raw(&self, step: u64) -> &str {
        self.buffers.get(&step).map(String::as_str).unwrap_or("")
    }

    /// Removes and returns the buffer of a finished step.
    pub fn finish(&mut self, step: u64) -> String {
        self.buffers.remove(&step).unwrap_or_default()
    }
}

/// Parses `input` as JSON, tolerating truncation.
///
/// Unterminated strings, arrays and objects are closed. When the tail is an
/// incomplete token (a dangling key, a half-written literal, a trailing
/// comma) characters are dropped from the end until the repaired text parses.
/// Returns `None` when no prefix of `input` forms a JSON object or array.
pub fn parse_partial_json(input: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(input) {
        return Some(value);
    }

    let trimmed = input.trim_start();
    if !trimmed.starts_with(['{', '[']) {
        return None;
    }

    let mut chars: Vec<char> = trimmed.chars().collect();
    while !chars.is_empty() {
        if let Some(candidate) = close_open_structures(&chars) {
            if let Ok(value) = serde_json::from_str(&candidate) {
                return Some(value);
            }
        }
        chars.pop();
    }
    None
}

/// Rewrites a JSON prefix so every open string and container is closed.
/// Returns `None` if the prefix contains a mismatched closing bracket.
fn close_open_structures(chars: &[char]) -> Option<String> {
    let mut out = String::with_capacity(chars.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for &c in chars {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            } else if c == '\n' {
                out.push_str("\\n");
                continue;
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    out.extend(closers.iter().rev());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_object_parses() {
        let value = parse_partial_json(r#"{"script":"hello"}"#).unwrap();
        assert_eq!(value, json!({"script": "hello"}));
    }

    #[test]
    fn test_unterminated_string_is_closed() {
        let value = parse_partial_json(r#"{"script": "partial"#).unwrap();
        assert_eq!(value, json!({"script": "partial"}));
    }

    #[test]
    fn test_dangling_key_is_dropped() {
        let value = parse_partial_json(r#"{"script": "done", "next_spea"#).unwrap();
        assert_eq!(value, json!({"script": "done"}));

        let value = parse_partial_json(r#"{"script": "done", "next_speaker": "jud"#).unwrap();
        assert_eq!(value, json!({"script": "done", "next_speaker": "jud"}));
    }

    #[test]
    fn test_trailing_comma_and_colon_are_tolerated() {
        assert_eq!(
            parse_partial_json(r#"{"script": "a","#).unwrap(),
            json!({"script": "a"})
        );
        assert_eq!(parse_partial_json(r#"{"script":"#).unwrap(), json!({}));
    }

    #[test]
    fn test_dangling_escape_is_dropped() {
        let value = parse_partial_json(r#"{"script": "say \"hi\" and \"#).unwrap();
        assert_eq!(value, json!({"script": "say \"hi\" and "}));
    }

    #[test]
    fn test_raw_newline_inside_string() {
        let value = parse_partial_json("{\"script\": \"line one\nline two").unwrap();
        assert_eq!(value, json!({"script": "line one\nline two"}));
    }

    #[test]
    fn test_nested_containers_are_closed() {
        let value = parse_partial_json(r#"{"a": [1, {"b": "c"#).unwrap();
        assert_eq!(value, json!({"a": [1, {"b": "c"}]}));
    }

    #[test]
    fn test_non_json_prefix_yields_nothing() {
        assert_eq!(parse_partial_json("Sure! Here is"), None);
        assert_eq!(parse_partial_json(""), None);
        assert_eq!(parse_partial_json("]"), None);
    }

    #[test]
    fn test_single_and_split_fragments_reveal_same_script() {
        let mut whole = PartialJsonAccumulator::new();
        let revealed = whole.append(1, r#"{"script":"hello"}"#).unwrap();
        assert_eq!(revealed.script(), Some("hello"));

        let mut split = PartialJsonAccumulator::new();
        let first = split.append(1, r#"{"script":"hel"#).unwrap();
        assert_eq!(first.script(), Some("hel"));
        let second = split.append(1, r#"lo"}"#).unwrap();
        assert_eq!(second.script(), Some("hello"));
    }

    #[test]
    fn test_empty_fragment_is_ignored() {
        let mut acc = PartialJsonAccumulator::new();
        assert_eq!(acc.append(3, ""), None);
        assert_eq!(acc.raw(3), "");
        acc.append(3, "{\"script\":\"x");
        assert_eq!(acc.append(3, ""), None);
        assert_eq!(acc.raw(3), "{\"script\":\"x");
    }

    #[test]
    fn test_steps_have_independent_buffers() {
        let mut acc = PartialJsonAccumulator::new();
        acc.append(1, r#"{"script":"first"#);
        let other = acc.append(2, r#"{"script":"second"}"#).unwrap();
        assert_eq!(other.script(), Some("second"));
        assert_eq!(acc.finish(1), r#"{"script":"first"#);
        assert_eq!(acc.raw(1), "");
    }

    #[test]
    fn test_byte_sized_fragments() {
        let mut acc = PartialJsonAccumulator::new();
        let mut last = None;
        for c in r#"{"script": "tiny steps", "winner": "negative"}"#.chars() {
            if let Some(fields) = acc.append(7, &c.to_string()) {
                if let Some(script) = fields.script() {
                    last = Some(script.to_string());
                }
            }
        }
        assert_eq!(last.as_deref(), Some("tiny steps"));
    }
}
