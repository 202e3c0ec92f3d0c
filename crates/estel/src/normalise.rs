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

//! Fixed repairs applied to a decoded chart candidate before strict
//! validation. Every rule is idempotent.

use crate::chart_catalog::{ChartKind, Field, FieldShape};
use crate::chart_spec::DEFAULT_TITLE;
use crate::data_profile::DataProfile;
use serde_json::{Map, Value};
use tracing::debug;

pub const TITLE_MAX_CHARS: usize = 80;

const PLACEHOLDER_TITLES: [&str; 5] = ["", "chart", "untitled", "title", "chart title"];

pub fn normalise(
    mut candidate: Map<String, Value>,
    profile: &DataProfile,
    question: &str,
) -> Map<String, Value> {
    normalise_kind(&mut candidate);
    let kind = candidate
        .get("chart_type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ChartKind>().ok());
    if kind == Some(ChartKind::Treemap) {
        relocate_treemap_hierarchy(&mut candidate);
    }
    unwrap_single_column_lists(&mut candidate);
    if kind == Some(ChartKind::Pie) {
        resolve_pie_values(&mut candidate, profile);
    }
    align_column_case(&mut candidate, profile);
    normalise_title(&mut candidate, question);
    candidate
}

fn normalise_kind(candidate: &mut Map<String, Value>) {
    if !candidate.contains_key("chart_type") {
        if let Some(kind) = candidate.remove("type").or_else(|| candidate.remove("kind")) {
            candidate.insert("chart_type".to_string(), kind);
        }
    }
    if let Some(Value::String(kind)) = candidate.get_mut("chart_type") {
        let cleaned = kind.trim().to_lowercase();
        if *kind != cleaned {
            *kind = cleaned;
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn relocate_treemap_hierarchy(candidate: &mut Map<String, Value>) {
    if let Some(Value::String(single)) = candidate.get("path") {
        if !single.trim().is_empty() {
            let wrapped = Value::Array(vec![Value::String(single.clone())]);
            candidate.insert("path".to_string(), wrapped);
        }
    }
    // A list in `x` is a misplaced hierarchy; `y` goes with it.
    if matches!(candidate.get("x"), Some(Value::Array(_))) {
        if let Some(hierarchy) = candidate.remove("x") {
            candidate.remove("y");
            if is_blank(candidate.get("path")) {
                debug!("Moving treemap hierarchy from 'x' to 'path'");
                candidate.insert("path".to_string(), hierarchy);
            }
        }
    }
    if matches!(candidate.get("names"), Some(Value::Array(items)) if items.len() > 1) {
        if let Some(hierarchy) = candidate.remove("names") {
            if is_blank(candidate.get("path")) {
                debug!("Moving treemap hierarchy from 'names' to 'path'");
                candidate.insert("path".to_string(), hierarchy);
            }
        }
    }
}

fn unwrap_single_column_lists(candidate: &mut Map<String, Value>) {
    for field in Field::ALL.iter().filter(|f| f.shape() == FieldShape::Column) {
        if let Some(value) = candidate.get_mut(field.as_str()) {
            let single = match value {
                Value::Array(items) if items.len() == 1 && items[0].is_string() => items.pop(),
                _ => None,
            };
            if let Some(inner) = single {
                *value = inner;
            }
        }
    }
}

fn resolve_pie_values(candidate: &mut Map<String, Value>, profile: &DataProfile) {
    let literal = match candidate.get("values") {
        Some(Value::Number(_)) => true,
        Some(Value::Array(items)) => !items.is_empty() && items.iter().all(Value::is_number),
        _ => false,
    };
    if !literal {
        return;
    }
    if let Some(column) = profile.first_numeric_column() {
        debug!(column = column, "Resolving literal pie values to a numeric column");
        candidate.insert("values".to_string(), Value::String(column.to_string()));
    }
}

/// Rewrites column references that match an existing column only up to case.
fn align_column_case(candidate: &mut Map<String, Value>, profile: &DataProfile) {
    let resolve = |name: &str| -> Option<String> {
        if profile.has_column(name) {
            return None;
        }
        profile
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .map(|c| c.name.clone())
    };
    for field in Field::ALL {
        let Some(value) = candidate.get_mut(field.as_str()) else {
            continue;
        };
        match (field.shape(), value) {
            (FieldShape::Column, Value::String(name)) => {
                if let Some(actual) = resolve(name) {
                    *name = actual;
                }
            }
            (FieldShape::ColumnList, Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::String(name) = item {
                        if let Some(actual) = resolve(name) {
                            *name = actual;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn normalise_title(candidate: &mut Map<String, Value>, question: &str) {
    let current = candidate.get("title").and_then(Value::as_str).map(str::trim);
    let placeholder = match current {
        Some(t) => PLACEHOLDER_TITLES.contains(&t.to_lowercase().as_str()),
        None => true,
    };
    if placeholder {
        candidate.insert("title".to_string(), Value::String(title_from_question(question)));
    }
}

/// Leading part of the question, title-cased.
pub fn title_from_question(question: &str) -> String {
    let leading: String = question.trim().chars().take(TITLE_MAX_CHARS).collect();
    let titled = title_case(leading.trim());
    if titled.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        titled
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(ch);
            previous_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profile::Record;
    use serde_json::json;

    fn profile(value: Value) -> DataProfile {
        let rows: Vec<Record> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        DataProfile::from_rows(&rows)
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn gdp_profile() -> DataProfile {
        profile(json!([
            {"Continent": "Asia", "Country": "China", "GDP_Billion": 17700},
            {"Continent": "Europe", "Country": "Germany", "GDP_Billion": 4200}
        ]))
    }

    #[test]
    fn treemap_hierarchy_moves_from_x_to_path() {
        let out = normalise(
            object(json!({"chart_type": "treemap", "x": ["Continent", "Country"], "values": "GDP_Billion"})),
            &gdp_profile(),
            "gdp by country",
        );
        assert_eq!(out["path"], json!(["Continent", "Country"]));
        assert!(!out.contains_key("x"));
        assert!(!out.contains_key("y"));
    }

    #[test]
    fn treemap_hierarchy_moves_from_names_to_path() {
        let out = normalise(
            object(json!({"chart_type": "treemap", "names": ["Continent", "Country"], "values": "GDP_Billion"})),
            &gdp_profile(),
            "gdp",
        );
        assert_eq!(out["path"], json!(["Continent", "Country"]));
        assert!(!out.contains_key("names"));
    }

    #[test]
    fn existing_path_is_kept_and_stray_hierarchy_dropped() {
        let out = normalise(
            object(json!({
                "chart_type": "treemap",
                "path": ["Continent"],
                "x": ["Continent", "Country"],
                "y": "GDP_Billion",
                "names": ["Continent", "Country"],
                "values": "GDP_Billion"
            })),
            &gdp_profile(),
            "gdp",
        );
        assert_eq!(out["path"], json!(["Continent"]));
        assert!(!out.contains_key("x"));
        assert!(!out.contains_key("y"));
        assert!(!out.contains_key("names"));
    }

    #[test]
    fn single_element_lists_unwrap() {
        let out = normalise(
            object(json!({"chart_type": " BAR ", "x": ["Continent"], "y": ["GDP_Billion"], "color": [1]})),
            &gdp_profile(),
            "gdp",
        );
        assert_eq!(out["chart_type"], "bar");
        assert_eq!(out["x"], "Continent");
        assert_eq!(out["y"], "GDP_Billion");
        assert_eq!(out["color"], json!([1]));
    }

    #[test]
    fn pie_literal_values_resolve_to_first_numeric_column() {
        let share = profile(json!([
            {"Region": "North", "MarketShare": 42},
            {"Region": "South", "MarketShare": 28},
            {"Region": "East", "MarketShare": 22},
            {"Region": "West", "MarketShare": 8}
        ]));
        let out = normalise(
            object(json!({"chart_type": "pie", "names": "Region", "values": [42, 28, 22, 8]})),
            &share,
            "market share by region",
        );
        assert_eq!(out["values"], "MarketShare");
    }

    #[test]
    fn column_case_is_aligned() {
        let out = normalise(
            object(json!({"chart_type": "bar", "x": "continent", "y": "gdp_billion"})),
            &gdp_profile(),
            "gdp",
        );
        assert_eq!(out["x"], "Continent");
        assert_eq!(out["y"], "GDP_Billion");
    }

    #[test]
    fn placeholder_titles_come_from_the_question() {
        let out = normalise(
            object(json!({"chart_type": "bar", "title": "Chart"})),
            &gdp_profile(),
            "show GDP by continent",
        );
        assert_eq!(out["title"], "Show Gdp By Continent");
        let kept = normalise(
            object(json!({"chart_type": "bar", "title": "GDP Overview"})),
            &gdp_profile(),
            "whatever",
        );
        assert_eq!(kept["title"], "GDP Overview");
    }

    #[test]
    fn long_questions_are_cut() {
        let question = "a".repeat(200);
        assert_eq!(title_from_question(&question).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(title_from_question("   "), DEFAULT_TITLE);
    }

    #[test]
    fn normalisation_is_idempotent() {
        let input = object(json!({"type": "Treemap", "names": ["continent", "Country"], "values": ["GDP_Billion"]}));
        let once = normalise(input, &gdp_profile(), "gdp tree");
        let twice = normalise(once.clone(), &gdp_profile(), "gdp tree");
        assert_eq!(once, twice);
    }
}
