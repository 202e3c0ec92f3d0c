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

use crate::database::schema_catalog::{schema_context, SchemaRetriever, TableDdl, DEFAULT_TOP_K};
use crate::database::statement::extract_statement;
use crate::database::types::DatabaseError;
use crate::llm::LLMAdapter;
use async_trait::async_trait;
use llm_contracts::{LLMError, LLMRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Schema lookup failed: {0}")]
    Schema(String),
    #[error("Query generation failed: {0}")]
    Service(String),
    #[error("Query generation returned no statement")]
    EmptyQuery,
}
impl From<LLMError> for SynthesisError {
    fn from(err: LLMError) -> Self {
        SynthesisError::Service(err.to_string())
    }
}
impl From<DatabaseError> for SynthesisError {
    fn from(err: DatabaseError) -> Self {
        SynthesisError::Schema(err.to_string())
    }
}

/// Turns a question, and the reason the previous attempt was rejected, into
/// a single query.
#[async_trait]
pub trait QuerySynthesizer: Send + Sync {
    async fn synthesize(&self, question: &str, hint: Option<&str>) -> Result<String, SynthesisError>;
}

pub const SYNTHESIS_SYSTEM_PROMPT: &str =
    "You are an expert PostgreSQL data analyst. You write one valid SQL query that answers the user's question.";

pub fn build_synthesis_prompt(schema: &str, question: &str, hint: Option<&str>) -> String {
    let mut prompt = format!(
        "### SCHEMA CONTEXT (use ONLY these tables):\n{schema}\n\n### USER QUESTION:\n{question}\n\n"
    );
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        prompt.push_str(&format!(
            "### PREVIOUS ATTEMPT WAS REJECTED:\n{hint}\nWrite a different query that avoids this problem.\n\n"
        ));
    }
    prompt.push_str(
        "### INSTRUCTIONS:\n\
         1. Return ONLY the SQL query, without markdown markers.\n\
         2. Use table aliases (e.g. soh for SalesOrderHeader) to keep it readable.\n\
         3. If you join tables, make sure the foreign keys match.\n\
         4. Do NOT make up columns. Use the schema provided.\n\
         5. Wrap schema, table and column names in double quotes.\n\n\
         ### SQL QUERY:\n",
    );
    prompt
}

pub struct LlmQuerySynthesizer {
    llm: Arc<dyn LLMAdapter>,
    retriever: Arc<dyn SchemaRetriever>,
    top_k: usize,
}

impl LlmQuerySynthesizer {
    pub fn new(llm: Arc<dyn LLMAdapter>, retriever: Arc<dyn SchemaRetriever>) -> Self {
        Self {
            llm,
            retriever,
            top_k: DEFAULT_TOP_K,
        }
    }
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

#[async_trait]
impl QuerySynthesizer for LlmQuerySynthesizer {
    #[instrument(skip(self, hint), fields(has_hint = hint.is_some()))]
    async fn synthesize(&self, question: &str, hint: Option<&str>) -> Result<String, SynthesisError> {
        let tables = self.retriever.retrieve(question, self.top_k).await?;
        info!(
            tables = ?tables.iter().map(TableDdl::full_name).collect::<Vec<_>>(),
            "Schema context retrieved"
        );
        let prompt = build_synthesis_prompt(&schema_context(&tables), question, hint);
        let request = LLMRequest::new(prompt)
            .with_system_prompt(SYNTHESIS_SYSTEM_PROMPT)
            .with_temperature(0.0)
            .with_metadata("stage", serde_json::json!("synthesis"));
        let response = self.llm.generate_response(request).await?;
        let query = extract_statement(&response.content);
        if query.is_empty() {
            return Err(SynthesisError::EmptyQuery);
        }
        debug!(query = %query, "Synthesised query");
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_section_only_when_present() {
        let without = build_synthesis_prompt("CREATE TABLE Sales.Store (\n);", "list stores", None);
        assert!(!without.contains("REJECTED"));
        let blank = build_synthesis_prompt("", "list stores", Some("  "));
        assert!(!blank.contains("REJECTED"));
        let with = build_synthesis_prompt(
            "",
            "list stores",
            Some("execution error: column \"name\" does not exist"),
        );
        assert!(with.contains("### PREVIOUS ATTEMPT WAS REJECTED:\nexecution error: column \"name\" does not exist"));
        assert!(with.ends_with("### SQL QUERY:\n"));
    }
}
