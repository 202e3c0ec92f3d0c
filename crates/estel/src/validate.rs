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

use crate::chart_catalog::{ChartCatalog, ChartKind, Field, FieldShape, KindSchema, BARMODES};
use crate::chart_spec::{ChartSpec, FieldValue, DEFAULT_TITLE};
use crate::data_profile::DataProfile;
use crate::error::ValidationError;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Strict check of a normalised candidate against the chart catalogue and the
/// columns actually present in the data.
pub fn validate_chart_spec(
    candidate: &Map<String, Value>,
    profile: &DataProfile,
    catalog: &ChartCatalog,
) -> Result<ChartSpec, ValidationError> {
    let raw_kind = match candidate.get("chart_type") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
        _ => return Err(ValidationError::MissingKind),
    };
    let kind: ChartKind = raw_kind
        .parse()
        .map_err(|_| ValidationError::UnsupportedKind {
            kind: raw_kind.to_string(),
            supported: ChartKind::supported_list(),
        })?;
    let schema = catalog.schema(kind);
    let title = candidate
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);
    let mut spec = ChartSpec::new(kind, title);
    for field in &schema.required {
        let value = parse_field(kind, *field, candidate.get(field.as_str()))?.ok_or_else(|| {
            ValidationError::MissingField {
                kind: kind.to_string(),
                field: field.to_string(),
            }
        })?;
        check_columns(*field, &value, profile)?;
        spec.fields.insert(*field, value);
    }
    for field in &schema.optional {
        match parse_field(kind, *field, candidate.get(field.as_str())) {
            Ok(Some(value)) => match check_columns(*field, &value, profile) {
                Ok(()) => {
                    spec.fields.insert(*field, value);
                }
                Err(err) => warn!(kind = %kind, field = %field, error = %err, "Dropping optional chart field"),
            },
            Ok(None) => {}
            Err(err) => warn!(kind = %kind, field = %field, error = %err, "Dropping optional chart field"),
        }
    }
    log_ignored_fields(candidate, schema);
    Ok(spec)
}

fn parse_field(
    kind: ChartKind,
    field: Field,
    value: Option<&Value>,
) -> Result<Option<FieldValue>, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidField {
        kind: kind.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    };
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    match field.shape() {
        FieldShape::Column => match value {
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(FieldValue::Column(s.trim().to_string()))),
            Value::Array(items) if items.is_empty() => Ok(None),
            _ => Err(invalid("expected a single column name")),
        },
        FieldShape::ColumnList => match value {
            Value::Array(items) if items.is_empty() => Ok(None),
            Value::Array(items) => {
                let mut columns = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str().map(str::trim) {
                        Some(c) if !c.is_empty() => columns.push(c.to_string()),
                        _ => return Err(invalid("expected a list of column names")),
                    }
                }
                Ok(Some(FieldValue::Columns(columns)))
            }
            Value::String(s) if s.trim().is_empty() => Ok(None),
            _ => Err(invalid("expected a list of column names")),
        },
        FieldShape::Count => {
            let count = match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            match count.and_then(|n| u32::try_from(n).ok()) {
                Some(n) if n > 0 => Ok(Some(FieldValue::Count(n))),
                _ => Err(invalid("expected a positive integer")),
            }
        }
        FieldShape::Mode => match value.as_str().map(|s| s.trim().to_lowercase()) {
            Some(mode) if mode.is_empty() => Ok(None),
            Some(mode) if BARMODES.contains(&mode.as_str()) => Ok(Some(FieldValue::Mode(mode))),
            _ => Err(invalid("expected one of group, stack, relative, overlay")),
        },
    }
}

fn check_columns(
    field: Field,
    value: &FieldValue,
    profile: &DataProfile,
) -> Result<(), ValidationError> {
    if profile.columns.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = match value {
        FieldValue::Column(c) => vec![c.as_str()],
        FieldValue::Columns(cs) => cs.iter().map(String::as_str).collect(),
        FieldValue::Count(_) | FieldValue::Mode(_) => return Ok(()),
    };
    match names.into_iter().find(|c| !profile.has_column(c)) {
        Some(missing) => Err(ValidationError::UnknownColumn {
            field: field.to_string(),
            column: missing.to_string(),
            available: profile.column_list(),
        }),
        None => Ok(()),
    }
}

fn log_ignored_fields(candidate: &Map<String, Value>, schema: &KindSchema) {
    for key in candidate.keys() {
        if key == "chart_type" || key == "title" {
            continue;
        }
        let accepted = Field::from_name(key).is_some_and(|f| schema.accepts(f));
        if !accepted {
            debug!(kind = %schema.kind, field = %key, "Ignoring field outside chart schema");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profile::Record;
    use serde_json::json;

    fn sales_profile() -> DataProfile {
        let rows: Vec<Record> = vec![
            json!({"Product": "Widget", "Revenue": 120.5, "Region": "North", "Units": 3}),
            json!({"Product": "Gadget", "Revenue": 80.0, "Region": "South", "Units": 5}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        DataProfile::from_rows(&rows)
    }

    fn check(value: Value) -> Result<ChartSpec, ValidationError> {
        validate_chart_spec(
            value.as_object().unwrap(),
            &sales_profile(),
            ChartCatalog::builtin(),
        )
    }

    #[test]
    fn accepts_bar_with_optional_fields() {
        let spec = check(json!({
            "chart_type": "bar", "title": "Revenue", "x": "Product", "y": "Revenue",
            "color": "Region", "barmode": "Stack"
        }))
        .unwrap();
        assert_eq!(spec.kind, ChartKind::Bar);
        assert_eq!(spec.column(Field::Color), Some("Region"));
        assert_eq!(spec.mode(Field::Barmode), Some("stack"));
    }

    #[test]
    fn fields_outside_schema_are_ignored() {
        let spec = check(json!({
            "chart_type": "line", "x": "Product", "y": "Revenue", "names": "Region", "nbins": 4
        }))
        .unwrap();
        assert_eq!(spec.fields.len(), 2);
        assert_eq!(spec.title, DEFAULT_TITLE);
    }

    #[test]
    fn bad_optional_fields_are_dropped() {
        let spec = check(json!({
            "chart_type": "histogram", "x": "Revenue", "nbins": -3, "color": "Missing"
        }))
        .unwrap();
        assert_eq!(spec.count(Field::Nbins), None);
        assert_eq!(spec.column(Field::Color), None);
    }

    #[test]
    fn unsupported_kind() {
        let err = check(json!({"chart_type": "sunburst", "path": ["Region"]})).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedKind { ref kind, .. } if kind == "sunburst"));
        assert_eq!(check(json!({"x": "Product"})).unwrap_err(), ValidationError::MissingKind);
    }

    #[test]
    fn empty_required_field_fails() {
        let err = check(json!({"chart_type": "bar", "x": "Product", "y": "  "})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: "bar".into(),
                field: "y".into()
            }
        );
    }

    #[test]
    fn unknown_required_column_fails() {
        let err = check(json!({"chart_type": "pie", "names": "Region", "values": "Profit"})).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownColumn { ref column, .. } if column == "Profit"));
    }

    #[test]
    fn treemap_path_must_be_a_list_of_names() {
        let err = check(json!({"chart_type": "treemap", "path": [1, 2], "values": "Revenue"})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { .. }));
        let spec = check(json!({"chart_type": "treemap", "path": ["Region", "Product"], "values": "Revenue"})).unwrap();
        assert_eq!(
            spec.columns(Field::Path),
            Some(&["Region".to_string(), "Product".to_string()][..])
        );
    }
}
