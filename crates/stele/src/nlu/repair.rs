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
use llm_contracts::{LLMError, LLMRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    #[error("Repair service error: {0}")]
    Service(String),
    #[error("Repair service returned an empty response")]
    EmptyResponse,
}
impl From<LLMError> for RepairError {
    fn from(err: LLMError) -> Self {
        RepairError::Service(err.to_string())
    }
}

/// Produces a candidate fix for a query the store rejected. The response may
/// carry conversational wrapping; callers extract the statement.
#[async_trait]
pub trait QueryRepairer: Send + Sync {
    async fn repair(&self, broken_query: &str, error_message: &str) -> Result<String, RepairError>;
}

pub const REPAIR_SYSTEM_PROMPT: &str = "You are a PostgreSQL expert. You fix SQL queries that failed to execute.";

pub fn build_repair_prompt(broken_query: &str, error_message: &str) -> String {
    format!(
        "A previous SQL query failed to execute. Fix it based on the error message.\n\n\
         ### BROKEN QUERY:\n{broken_query}\n\n\
         ### POSTGRES ERROR:\n{error_message}\n\n\
         ### INSTRUCTIONS:\n\
         1. Output ONLY the fixed SQL query.\n\
         2. Do NOT output markdown markers.\n\
         3. Fix syntax errors.\n\
         4. This database is case-sensitive. Wrap ALL table and schema names in double quotes, \
         e.g. \"Production\".\"Product\" instead of Production.Product.\n\n\
         ### FIXED SQL:\n"
    )
}

pub struct LlmQueryRepairer {
    llm: Arc<dyn LLMAdapter>,
}
impl LlmQueryRepairer {
    pub fn new(llm: Arc<dyn LLMAdapter>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryRepairer for LlmQueryRepairer {
    #[instrument(skip_all, fields(model = self.llm.model_name()))]
    async fn repair(&self, broken_query: &str, error_message: &str) -> Result<String, RepairError> {
        let request = LLMRequest::new(build_repair_prompt(broken_query, error_message))
            .with_system_prompt(REPAIR_SYSTEM_PROMPT)
            .with_temperature(0.0)
            .with_metadata("stage", serde_json::json!("repair"));
        let response = self.llm.generate_response(request).await?;
        if response.content.trim().is_empty() {
            return Err(RepairError::EmptyResponse);
        }
        debug!(chars = response.content.len(), "Repair response received");
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_query_error_and_quoting_rule() {
        let prompt = build_repair_prompt(
            "SELECT Name FROM Production.Product",
            r#"relation "production.product" does not exist"#,
        );
        assert!(prompt.contains("### BROKEN QUERY:\nSELECT Name FROM Production.Product"));
        assert!(prompt.contains(r#"### POSTGRES ERROR:
relation "production.product" does not exist"#));
        assert!(prompt.contains(r#""Production"."Product""#));
    }

    #[test]
    fn llm_errors_become_service_errors() {
        let err: RepairError = LLMError::Timeout(120).into();
        assert_eq!(err, RepairError::Service("Timeout error after 120s".into()));
    }
}
