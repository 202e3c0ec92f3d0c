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

use crate::chart_catalog::{ChartKind, Field};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_TITLE: &str = "Chart";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Column(String),
    Columns(Vec<String>),
    Count(u32),
    Mode(String),
}
impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Column(c) | FieldValue::Mode(c) => Value::String(c.clone()),
            FieldValue::Columns(cs) => Value::Array(cs.iter().cloned().map(Value::String).collect()),
            FieldValue::Count(n) => Value::from(*n),
        }
    }
}

/// A validated chart description: a kind from the closed set, a title and
/// the encodings that kind accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub fields: BTreeMap<Field, FieldValue>,
}
impl ChartSpec {
    pub fn new(kind: ChartKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            fields: BTreeMap::new(),
        }
    }
    pub fn with_column(mut self, field: Field, column: impl Into<String>) -> Self {
        self.fields.insert(field, FieldValue::Column(column.into()));
        self
    }
    pub fn with_path<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(
            Field::Path,
            FieldValue::Columns(columns.into_iter().map(Into::into).collect()),
        );
        self
    }
    pub fn column(&self, field: Field) -> Option<&str> {
        match self.fields.get(&field) {
            Some(FieldValue::Column(c)) => Some(c.as_str()),
            _ => None,
        }
    }
    pub fn columns(&self, field: Field) -> Option<&[String]> {
        match self.fields.get(&field) {
            Some(FieldValue::Columns(cs)) => Some(cs.as_slice()),
            _ => None,
        }
    }
    pub fn count(&self, field: Field) -> Option<u32> {
        match self.fields.get(&field) {
            Some(FieldValue::Count(n)) => Some(*n),
            _ => None,
        }
    }
    pub fn mode(&self, field: Field) -> Option<&str> {
        match self.fields.get(&field) {
            Some(FieldValue::Mode(m)) => Some(m.as_str()),
            _ => None,
        }
    }
    /// Every `(field, column)` pair this spec reads from the data.
    pub fn referenced_columns(&self) -> Vec<(Field, &str)> {
        let mut out = Vec::new();
        for (field, value) in &self.fields {
            match value {
                FieldValue::Column(c) => out.push((*field, c.as_str())),
                FieldValue::Columns(cs) => out.extend(cs.iter().map(|c| (*field, c.as_str()))),
                FieldValue::Count(_) | FieldValue::Mode(_) => {}
            }
        }
        out
    }
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
impl Serialize for ChartSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        map.serialize_entry("chart_type", self.kind.as_str())?;
        map.serialize_entry("title", &self.title)?;
        for (field, value) in &self.fields {
            map.serialize_entry(field.as_str(), &value.to_json())?;
        }
        map.end()
    }
}
