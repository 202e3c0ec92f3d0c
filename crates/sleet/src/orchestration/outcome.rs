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

use super::state::OrchestratorState;
use estel::{ChartSpec, Figure, Record};
use serde::Serialize;

pub const VISUALISATION_SKIPPED: &str = "visualisation was not attempted";
const NO_RESULT: &str = "pipeline stopped without a result";

/// What the presentation layer receives for one question.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    FullSuccess {
        query: String,
        rows: Vec<Record>,
        figure: Figure,
        spec: ChartSpec,
        summary: Option<String>,
    },
    /// Data came back but no chart could be produced.
    PartialSuccess {
        query: String,
        rows: Vec<Record>,
        summary: Option<String>,
        viz_error: String,
    },
    Failure {
        query: Option<String>,
        error: String,
    },
    Cancelled {
        query: Option<String>,
    },
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::FullSuccess { .. } => "full_success",
            Outcome::PartialSuccess { .. } => "partial_success",
            Outcome::Failure { .. } => "failure",
            Outcome::Cancelled { .. } => "cancelled",
        }
    }
    /// Data retrieval succeeded, whatever happened to the chart.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::FullSuccess { .. } | Outcome::PartialSuccess { .. })
    }
    pub fn visualisation_failed(&self) -> bool {
        matches!(self, Outcome::PartialSuccess { .. })
    }
    pub fn rows(&self) -> &[Record] {
        match self {
            Outcome::FullSuccess { rows, .. } | Outcome::PartialSuccess { rows, .. } => rows,
            _ => &[],
        }
    }
    pub fn query(&self) -> Option<&str> {
        match self {
            Outcome::FullSuccess { query, .. } | Outcome::PartialSuccess { query, .. } => Some(query),
            Outcome::Failure { query, .. } | Outcome::Cancelled { query } => query.as_deref(),
        }
    }
    pub fn figure(&self) -> Option<&Figure> {
        match self {
            Outcome::FullSuccess { figure, .. } => Some(figure),
            _ => None,
        }
    }
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::PartialSuccess { viz_error, .. } => Some(viz_error),
            Outcome::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Pure mapping from the final state to the caller-facing outcome.
/// Cancellation wins over any partial result.
pub fn assemble(state: &OrchestratorState) -> Outcome {
    let query = state.query.clone();
    if state.cancelled {
        return Outcome::Cancelled { query };
    }
    if !state.has_rows() {
        return Outcome::Failure {
            query,
            error: state
                .error_message
                .clone()
                .unwrap_or_else(|| NO_RESULT.to_string()),
        };
    }
    let rows = state.rows.clone().unwrap_or_default();
    let summary = state.result_summary.clone();
    let query = query.unwrap_or_default();
    match (
        state.render_succeeded,
        state.chart_payload.as_ref(),
        state.chart_spec.as_ref(),
    ) {
        (Some(true), Some(figure), Some(spec)) => Outcome::FullSuccess {
            query,
            rows,
            figure: figure.clone(),
            spec: spec.clone(),
            summary,
        },
        _ => Outcome::PartialSuccess {
            query,
            rows,
            summary,
            viz_error: state
                .render_error
                .clone()
                .unwrap_or_else(|| VISUALISATION_SKIPPED.to_string()),
        },
    }
}
