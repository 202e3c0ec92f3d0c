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

use crate::chart_catalog::ChartCatalog;
use crate::chart_spec::ChartSpec;
use crate::data_profile::DataProfile;
use crate::decode::decode_chart_response;
use crate::error::{ChartError, DecisionError};
use crate::normalise::normalise;
use crate::validate::validate_chart_spec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a decision service sees about the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDecisionRequest {
    pub question: String,
    pub columns: String,
    pub sample: String,
    pub row_count: usize,
    /// Why the previous decision was rejected, when re-deciding.
    pub previous_error: Option<String>,
}
impl ChartDecisionRequest {
    pub fn from_profile(question: &str, profile: &DataProfile) -> Self {
        Self {
            question: question.to_string(),
            columns: profile.describe_columns(),
            sample: profile.sample.clone(),
            row_count: profile.row_count,
            previous_error: None,
        }
    }
    pub fn with_previous_error(mut self, error: Option<String>) -> Self {
        self.previous_error = error;
        self
    }
}

/// Returns the raw response text; parsing and validation stay with the caller.
#[async_trait]
pub trait ChartDecider: Send + Sync {
    async fn decide(&self, request: &ChartDecisionRequest) -> Result<String, DecisionError>;
}

/// decode, normalise and validate one raw decision.
pub fn interpret_decision(
    raw: &str,
    profile: &DataProfile,
    question: &str,
    catalog: &ChartCatalog,
) -> Result<ChartSpec, ChartError> {
    let candidate = decode_chart_response(raw)?;
    let normalised = normalise(candidate, profile, question);
    Ok(validate_chart_spec(&normalised, profile, catalog)?)
}
