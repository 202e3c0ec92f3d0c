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

use thiserror::Error;
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Chart catalogue error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}
impl ChartError {
    /// Short stage tag used in logs and correction prompts.
    pub fn stage(&self) -> &'static str {
        match self {
            ChartError::Catalog(_) => "catalog",
            ChartError::Decision(_) => "decision",
            ChartError::Decode(_) => "decode",
            ChartError::Validation(_) => "validation",
            ChartError::Render(_) => "render",
        }
    }
}
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse chart catalogue YAML: {source}")]
    YamlParse {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Duplicate chart kind in catalogue: '{kind}'")]
    DuplicateKind { kind: String },
    #[error("Chart kind '{kind}' has no catalogue entry")]
    MissingKind { kind: String },
    #[error("Field '{field}' of chart kind '{kind}' is both required and optional")]
    ConflictingField { kind: String, field: String },
    #[error("Chart kind '{kind}' declares no required fields")]
    NoRequiredFields { kind: String },
}
#[derive(Error, Debug, Clone, PartialEq)]
#[error("chart decision service failed: {message}")]
pub struct DecisionError {
    pub message: String,
}
impl DecisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("response is empty")]
    Empty,
    #[error("no JSON object found in response")]
    NoObject,
    #[error("could not repair JSON object: {reason}")]
    Unrecoverable { reason: String },
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: String },
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("chart_type is missing")]
    MissingKind,
    #[error("unsupported chart_type '{kind}' (supported: {supported})")]
    UnsupportedKind { kind: String, supported: String },
    #[error("chart '{kind}' requires field '{field}'")]
    MissingField { kind: String, field: String },
    #[error("field '{field}' of chart '{kind}' has an invalid value: {reason}")]
    InvalidField {
        kind: String,
        field: String,
        reason: String,
    },
    #[error("column '{column}' referenced by '{field}' does not exist (available: {available})")]
    UnknownColumn {
        field: String,
        column: String,
        available: String,
    },
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("no rows to plot")]
    EmptyData,
    #[error("column '{column}' not found in data")]
    MissingColumn { column: String },
    #[error("column '{column}' must be numeric for {kind} charts")]
    NonNumeric { column: String, kind: String },
    #[error("renderer failed: {message}")]
    Failed { message: String },
}
pub type Result<T> = std::result::Result<T, ChartError>;
