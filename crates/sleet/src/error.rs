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

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which bounded loop ran out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStage {
    Orchestration,
    Execution,
    Render,
}
impl fmt::Display for RetryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetryStage::Orchestration => "orchestration",
            RetryStage::Execution => "execution",
            RetryStage::Render => "render",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("synthesis error: {0}")]
    Synthesis(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("the query returned 0 rows")]
    EmptyResult,
    #[error("decision error: {0}")]
    Decision(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("{stage} retry budget exhausted after {attempts} attempts: {last_error}")]
    BudgetExhausted {
        stage: RetryStage,
        attempts: u32,
        last_error: Box<PipelineError>,
    },
    #[error("orchestrator stopped after {0} transitions")]
    TransitionLimit(usize),
    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Maps a render-loop failure stage onto the taxonomy.
    pub fn from_chart_stage(stage: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            "decode" => PipelineError::Decode(message),
            "validation" => PipelineError::Validation(message),
            "decision" => PipelineError::Decision(message),
            _ => PipelineError::Render(message),
        }
    }
    pub fn budget_exhausted(stage: RetryStage, attempts: u32, last_error: PipelineError) -> Self {
        PipelineError::BudgetExhausted {
            stage,
            attempts,
            last_error: Box::new(last_error),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
