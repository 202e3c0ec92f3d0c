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

use crate::error::PipelineError;
use estel::{ChartSpec, Figure, Record};
use serde::Serialize;

/// Steps of the outer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Synthesize,
    Execute,
    CheckResult,
    Render,
    Done,
    GiveUp,
}
impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::GiveUp)
    }
}

/// The record threaded through one run. Created per question and dropped
/// once the outcome has been assembled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorState {
    pub question: String,
    pub query: Option<String>,
    pub correction_hint: Option<String>,
    pub execution_succeeded: Option<bool>,
    pub rows: Option<Vec<Record>>,
    pub result_summary: Option<String>,
    pub render_succeeded: Option<bool>,
    pub chart_payload: Option<Figure>,
    pub chart_spec: Option<ChartSpec>,
    pub error_message: Option<String>,
    pub render_error: Option<String>,
    /// Rejected outer attempts.
    pub retry_count: u32,
    pub synthesis_attempts: u32,
    /// Repairs used by the most recent execution loop.
    pub execution_attempts: u32,
    /// The most recent execution loop gave up with its repair budget spent.
    pub execution_exhausted: bool,
    /// Failed rounds in the render loop.
    pub render_attempts: u32,
    pub transitions: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub failure: Option<PipelineError>,
}

impl OrchestratorState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }
    pub fn has_rows(&self) -> bool {
        self.execution_succeeded == Some(true) && self.row_count() > 0
    }
    pub(crate) fn fail(&mut self, failure: PipelineError) {
        self.error_message = Some(failure.to_string());
        self.failure = Some(failure);
    }
}
