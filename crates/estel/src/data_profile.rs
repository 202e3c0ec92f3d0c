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

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One result row, keyed by column name in the order the store returned them.
pub type Record = Map<String, Value>;

pub const SAMPLE_ROWS: usize = 5;

const TEMPORAL_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Datetime64,
    Object,
}
impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Datetime64 => "datetime64",
            ColumnType::Object => "object",
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }
}
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: ColumnType,
}

/// Compact description of a result set, enough for a model to choose a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub columns: Vec<ColumnProfile>,
    pub row_count: usize,
    pub sample: String,
}
impl DataProfile {
    pub fn from_rows(rows: &[Record]) -> Self {
        let names = column_names(rows);
        let columns = names
            .iter()
            .map(|name| ColumnProfile {
                name: name.clone(),
                dtype: infer_column_type(rows.iter().filter_map(|r| r.get(name))),
            })
            .collect();
        Self {
            columns,
            row_count: rows.len(),
            sample: markdown_table(rows, &names, SAMPLE_ROWS),
        }
    }
    /// `"  - name: dtype"` per column.
    pub fn describe_columns(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("  - {}: {}", c.name, c.dtype))
            .collect::<Vec<_>>()
            .join("\n")
    }
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
    pub fn first_numeric_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.dtype.is_numeric())
            .map(|c| c.name.as_str())
    }
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn column_names(rows: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

fn infer_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for value in values {
        let current = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnType::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Int64,
            Value::Number(_) => ColumnType::Float64,
            Value::String(s) if is_temporal(s) => ColumnType::Datetime64,
            _ => return ColumnType::Object,
        };
        seen = Some(match (seen, current) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(a), b) if a.is_numeric() && b.is_numeric() => ColumnType::Float64,
            _ => return ColumnType::Object,
        });
    }
    seen.unwrap_or(ColumnType::Object)
}

fn is_temporal(s: &str) -> bool {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || TEMPORAL_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
}

pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pipe table over the first `limit` rows.
pub fn markdown_table(rows: &[Record], columns: &[String], limit: usize) -> String {
    if columns.is_empty() {
        return String::new();
    }
    let escape = |s: String| s.replace('|', "\\|").replace('\n', " ");
    let mut lines = Vec::with_capacity(rows.len().min(limit) + 2);
    lines.push(format!(
        "| {} |",
        columns.iter().map(|c| escape(c.clone())).collect::<Vec<_>>().join(" | ")
    ));
    lines.push(format!(
        "|{}|",
        columns.iter().map(|_| ":---").collect::<Vec<_>>().join("|")
    ));
    for row in rows.iter().take(limit) {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| escape(cell_text(row.get(c))))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}

/// Markdown rendering of a result set, noting truncation past `max_rows`.
pub fn summarise_rows(rows: &[Record], max_rows: usize) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    let columns = column_names(rows);
    let mut table = markdown_table(rows, &columns, max_rows);
    if rows.len() > max_rows {
        table.push_str(&format!("\n\n({} of {} rows shown)", max_rows, rows.len()));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn infers_column_types() {
        let data = rows(json!([
            {"Region": "North", "MarketShare": 42, "Growth": 1.5, "Active": true, "Since": "2023-01-01"},
            {"Region": "South", "MarketShare": 28, "Growth": 2, "Active": false, "Since": "2023-02-01T10:00:00"},
            {"Region": null, "MarketShare": null, "Growth": null, "Active": null, "Since": null}
        ]));
        let profile = DataProfile::from_rows(&data);
        let types: Vec<(&str, ColumnType)> = profile
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.dtype))
            .collect();
        assert_eq!(
            types,
            vec![
                ("Region", ColumnType::Object),
                ("MarketShare", ColumnType::Int64),
                ("Growth", ColumnType::Float64),
                ("Active", ColumnType::Bool),
                ("Since", ColumnType::Datetime64),
            ]
        );
        assert_eq!(profile.row_count, 3);
        assert_eq!(profile.first_numeric_column(), Some("MarketShare"));
    }

    #[test]
    fn describes_columns_and_sample() {
        let data = rows(json!([
            {"Product": "A", "Revenue": 10},
            {"Product": "B|C", "Revenue": 20}
        ]));
        let profile = DataProfile::from_rows(&data);
        assert_eq!(
            profile.describe_columns(),
            "  - Product: object\n  - Revenue: int64"
        );
        assert_eq!(
            profile.sample,
            "| Product | Revenue |\n|:---|:---|\n| A | 10 |\n| B\\|C | 20 |"
        );
    }

    #[test]
    fn sample_is_limited_to_five_rows() {
        let data: Vec<Record> = (0..8)
            .map(|i| json!({"n": i}).as_object().unwrap().clone())
            .collect();
        let profile = DataProfile::from_rows(&data);
        assert_eq!(profile.sample.lines().count(), 2 + SAMPLE_ROWS);
    }

    #[test]
    fn summary_notes_truncation() {
        let data: Vec<Record> = (0..4)
            .map(|i| json!({"n": i}).as_object().unwrap().clone())
            .collect();
        let summary = summarise_rows(&data, 2);
        assert!(summary.ends_with("(2 of 4 rows shown)"));
        assert_eq!(summarise_rows(&[], 2), "(no rows)");
    }
}
