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

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap();
    /// `SELECT` followed by something a select list starts with, so the English
    /// verb ("select the right table") is not taken for a statement.
    static ref QUERY_START: Regex = Regex::new(
        r#"(?i)\b(?:SELECT\s+(?:DISTINCT\b|CASE\b|\*|"|'|\d|\(|[A-Za-z_]\w*(?:\s*[,(*+/|-]|\.["\w]|\s+(?:AS|FROM)\b|\s*;|\s*\z))|WITH\s+(?:RECURSIVE\s+)?\w+\s+AS\s*\()"#
    )
    .unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\n[ \t]*\r?\n").unwrap();
}

/// Pulls the first query-shaped statement out of a model response, dropping
/// fences, prose and the trailing semicolon. Returns an empty string when the
/// response holds no statement.
pub fn extract_statement(response: &str) -> String {
    let body = FENCED_BLOCK
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|b| QUERY_START.is_match(b))
        .unwrap_or(response);
    let Some(start) = QUERY_START.find(body).map(|m| m.start()) else {
        return String::new();
    };
    let rest = &body[start..];
    let end = statement_end(rest)
        .or_else(|| BLANK_LINE.find(rest).map(|m| m.start()))
        .unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Byte offset of the first `;` outside string literals and quoted names.
fn statement_end(sql: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, ch) in sql.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(ch),
            (None, ';') => return Some(idx),
            _ => {}
        }
    }
    None
}
