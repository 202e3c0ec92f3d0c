// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Tolerant decoding of a chart decision response into a candidate JSON
//! object. No schema knowledge lives here; see `normalise` and `validate`.

use crate::error::DecodeError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap();
}

pub fn decode_chart_response(text: &str) -> Result<Map<String, Value>, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    let unfenced = strip_fences(text);
    let start = unfenced.find('{').ok_or(DecodeError::NoObject)?;
    let body = &unfenced[start..];
    let candidate = match balanced_object_end(body) {
        Some(end) => &body[..=end],
        None => body,
    };
    let mut fragment = strip_trailing_commas(candidate);
    loop {
        let repaired = close_open_structures(&fragment);
        match serde_json::from_str::<Value>(&repaired) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => {
                return Err(DecodeError::NotAnObject {
                    found: json_type_name(&other).to_string(),
                })
            }
            Err(err) => match last_comma_outside_strings(&fragment) {
                Some(idx) => {
                    debug!(error = %err, cut_at = idx, "Dropping trailing field from chart response");
                    fragment.truncate(idx);
                }
                None => {
                    return Err(DecodeError::Unrecoverable {
                        reason: err.to_string(),
                    })
                }
            },
        }
    }
}

/// Byte offset of the `}` closing the object that opens at offset 0, or `None`
/// when the response was cut off before it closed.
fn balanced_object_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (ch == '}').then_some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_fences(text: &str) -> &str {
    if !text.contains("```") {
        return text;
    }
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|body| body.contains('{'))
        .unwrap_or(text)
}

/// Removes commas that directly precede a closing `}` or `]`, leaving string
/// contents alone.
fn strip_trailing_commas(fragment: &str) -> String {
    let chars: Vec<char> = fragment.chars().collect();
    let mut out = String::with_capacity(fragment.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    out
}

/// Terminates an open string and appends the closers for any unbalanced
/// `{` or `[`.
fn close_open_structures(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 8);
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in fragment.chars() {
        out.push(ch);
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let keep = out
        .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
        .len();
    out.truncate(keep);
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

fn last_comma_outside_strings(fragment: &str) -> Option<usize> {
    let mut last = None;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in fragment.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            ',' => last = Some(idx),
            _ => {}
        }
    }
    last
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(text: &str) -> Value {
        Value::Object(decode_chart_response(text).unwrap())
    }

    #[test]
    fn plain_object() {
        assert_eq!(
            decoded(r#"{"chart_type": "bar", "x": "Product", "y": "Revenue"}"#),
            json!({"chart_type": "bar", "x": "Product", "y": "Revenue"})
        );
    }

    #[test]
    fn fenced_object_with_prose() {
        let text = "Sure! Here is the chart:\n```json\n{\"chart_type\": \"pie\", \"names\": \"Region\", \"values\": \"MarketShare\"}\n```\nLet me know.";
        assert_eq!(
            decoded(text),
            json!({"chart_type": "pie", "names": "Region", "values": "MarketShare"})
        );
    }

    #[test]
    fn prose_without_fences() {
        let text = "I would use {\"chart_type\": \"line\", \"x\": \"Month\", \"y\": \"Sales\"} for this.";
        assert_eq!(decoded(text)["chart_type"], "line");
    }

    #[test]
    fn trailing_commas_are_removed() {
        let text = r#"{"chart_type": "treemap", "path": ["Continent", "Country",], "values": "GDP",}"#;
        assert_eq!(
            decoded(text),
            json!({"chart_type": "treemap", "path": ["Continent", "Country"], "values": "GDP"})
        );
    }

    #[test]
    fn commas_inside_strings_survive() {
        let text = r#"{"chart_type": "bar", "title": "Sales, by region,}", "x": "Region", "y": "Sales"}"#;
        assert_eq!(decoded(text)["title"], "Sales, by region,}");
    }

    #[test]
    fn truncated_value_is_dropped() {
        let text = r#"{"chart_type": "bar", "x": "Product", "y": "Revenue", "color":"#;
        assert_eq!(
            decoded(text),
            json!({"chart_type": "bar", "x": "Product", "y": "Revenue"})
        );
    }

    #[test]
    fn truncated_string_is_closed() {
        let text = r#"{"chart_type": "bar", "x": "Product", "y": "Reven"#;
        assert_eq!(decoded(text)["y"], "Reven");
    }

    #[test]
    fn truncated_nested_list_is_closed() {
        let text = r#"```json
{"chart_type": "treemap", "values": "GDP_Billion", "path": ["Continent", "Country""#;
        assert_eq!(
            decoded(text)["path"],
            json!(["Continent", "Country"])
        );
    }

    #[test]
    fn truncated_key_is_dropped() {
        let text = r#"{"chart_type": "histogram", "x": "Age", "nbi"#;
        assert_eq!(decoded(text), json!({"chart_type": "histogram", "x": "Age"}));
    }

    #[test]
    fn truncation_after_a_nested_object_keeps_later_fields() {
        let text = r#"{"chart_type": "bar", "extra": {"k": 1}, "x": "Region", "title": "Sal"#;
        assert_eq!(
            decoded(text),
            json!({"chart_type": "bar", "extra": {"k": 1}, "x": "Region", "title": "Sal"})
        );
    }

    #[test]
    fn prose_after_the_object_is_ignored() {
        let text = r#"{"chart_type": "pie", "names": "Region", "values": "Share"} and {braces} in prose"#;
        assert_eq!(decoded(text)["values"], "Share");
    }

    #[test]
    fn failures() {
        assert_eq!(decode_chart_response("   "), Err(DecodeError::Empty));
        assert_eq!(
            decode_chart_response("I cannot decide on a chart."),
            Err(DecodeError::NoObject)
        );
        assert!(matches!(
            decode_chart_response("{ not json at all"),
            Err(DecodeError::Unrecoverable { .. })
        ));
    }
}
