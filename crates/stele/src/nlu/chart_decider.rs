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

use crate::llm::LLMAdapter;
use async_trait::async_trait;
use estel::{
    build_decision_prompt, ChartCatalog, ChartDecider, ChartDecisionRequest, DecisionError,
    DECISION_SYSTEM_PROMPT,
};
use llm_contracts::LLMRequest;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Asks the model for a chart spec. The raw reply goes back to the render
/// loop, which decodes and validates it.
pub struct LlmChartDecider {
    llm: Arc<dyn LLMAdapter>,
    catalog: &'static ChartCatalog,
}

impl LlmChartDecider {
    pub fn new(llm: Arc<dyn LLMAdapter>) -> Self {
        Self {
            llm,
            catalog: ChartCatalog::builtin(),
        }
    }
}

#[async_trait]
impl ChartDecider for LlmChartDecider {
    #[instrument(skip_all, fields(rows = request.row_count, retry = request.previous_error.is_some()))]
    async fn decide(&self, request: &ChartDecisionRequest) -> Result<String, DecisionError> {
        let llm_request = LLMRequest::new(build_decision_prompt(request, self.catalog))
            .with_system_prompt(DECISION_SYSTEM_PROMPT)
            .with_temperature(0.0)
            .with_metadata("stage", serde_json::json!("chart_decision"));
        let response = self
            .llm
            .generate_response(llm_request)
            .await
            .map_err(|e| DecisionError::new(e.to_string()))?;
        debug!(chars = response.content.len(), "Chart decision received");
        Ok(response.content)
    }
}
