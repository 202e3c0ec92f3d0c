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

use crate::error::CatalogError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

static BUILTIN_CATALOG: Lazy<ChartCatalog> = Lazy::new(|| {
    ChartCatalog::from_yaml_string(include_str!("../config/chart_kinds.yml"))
        .expect("embedded chart catalogue")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
    Heatmap,
    Treemap,
}
impl ChartKind {
    pub const ALL: [ChartKind; 8] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Scatter,
        ChartKind::Pie,
        ChartKind::Histogram,
        ChartKind::Box,
        ChartKind::Heatmap,
        ChartKind::Treemap,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Treemap => "treemap",
        }
    }
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(ChartKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for ChartKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown chart kind '{}'", s.trim()))
    }
}

/// The value shape a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Column,
    ColumnList,
    Count,
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    X,
    Y,
    Z,
    Color,
    Size,
    Names,
    Values,
    Path,
    Nbins,
    Barmode,
}
impl Field {
    pub const ALL: [Field; 10] = [
        Field::X,
        Field::Y,
        Field::Z,
        Field::Color,
        Field::Size,
        Field::Names,
        Field::Values,
        Field::Path,
        Field::Nbins,
        Field::Barmode,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::X => "x",
            Field::Y => "y",
            Field::Z => "z",
            Field::Color => "color",
            Field::Size => "size",
            Field::Names => "names",
            Field::Values => "values",
            Field::Path => "path",
            Field::Nbins => "nbins",
            Field::Barmode => "barmode",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
    pub fn shape(&self) -> FieldShape {
        match self {
            Field::Path => FieldShape::ColumnList,
            Field::Nbins => FieldShape::Count,
            Field::Barmode => FieldShape::Mode,
            _ => FieldShape::Column,
        }
    }
}
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const BARMODES: [&str; 4] = ["group", "stack", "relative", "overlay"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSchema {
    pub kind: ChartKind,
    pub description: String,
    pub rule: String,
    pub required: Vec<Field>,
    #[serde(default)]
    pub optional: Vec<Field>,
}
impl KindSchema {
    pub fn accepts(&self, field: Field) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }
    pub fn is_required(&self, field: Field) -> bool {
        self.required.contains(&field)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    kinds: Vec<KindSchema>,
}

/// Read-only description of every supported chart kind.
#[derive(Debug, Clone)]
pub struct ChartCatalog {
    kinds: Vec<KindSchema>,
    by_kind: HashMap<ChartKind, usize>,
}
impl ChartCatalog {
    pub fn builtin() -> &'static ChartCatalog {
        &BUILTIN_CATALOG
    }
    pub fn from_yaml_string(yaml_content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml_content)?;
        let mut by_kind = HashMap::new();
        for (idx, schema) in file.kinds.iter().enumerate() {
            if by_kind.insert(schema.kind, idx).is_some() {
                return Err(CatalogError::DuplicateKind {
                    kind: schema.kind.to_string(),
                });
            }
            if schema.required.is_empty() {
                return Err(CatalogError::NoRequiredFields {
                    kind: schema.kind.to_string(),
                });
            }
            if let Some(field) = schema.optional.iter().find(|f| schema.required.contains(f)) {
                return Err(CatalogError::ConflictingField {
                    kind: schema.kind.to_string(),
                    field: field.to_string(),
                });
            }
        }
        if let Some(missing) = ChartKind::ALL.iter().find(|k| !by_kind.contains_key(k)) {
            return Err(CatalogError::MissingKind {
                kind: missing.to_string(),
            });
        }
        Ok(Self {
            kinds: file.kinds,
            by_kind,
        })
    }
    pub fn schema(&self, kind: ChartKind) -> &KindSchema {
        // every kind is present once construction succeeded
        &self.kinds[self.by_kind[&kind]]
    }
    pub fn kinds(&self) -> &[KindSchema] {
        &self.kinds
    }
    /// One line per kind, used when asking a model to pick a chart.
    pub fn rules_text(&self) -> String {
        self.kinds
            .iter()
            .map(|s| format!("- {}: {}", s.kind, s.rule))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
