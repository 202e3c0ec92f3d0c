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

use llm_contracts::{LLMError, LLMRequest, LlmSettings};
use serde_json::json;
use std::sync::Arc;
use stele::database::StaticSchemaRetriever;
use stele::{
    LLMAdapter, LlmQuerySynthesizer, OllamaAdapter, QuerySynthesizer, SynthesisError, TableDdl,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> LlmSettings {
    LlmSettings {
        base_url: server.uri(),
        timeout_seconds: 5,
        max_retries: 1,
        ..LlmSettings::default()
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "model": "llama3",
        "message": {"role": "assistant", "content": content},
        "done": true,
        "prompt_eval_count": 120,
        "eval_count": 30
    })
}

#[tokio::test]
async fn chat_request_is_not_streamed_and_usage_is_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("SELECT 1")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(&settings(&server)).unwrap();
    let response = adapter
        .generate_response(LLMRequest::new("ping").with_system_prompt("Write SQL."))
        .await
        .unwrap();
    assert_eq!(response.content, "SELECT 1");
    assert_eq!(response.usage.total_tokens, 150);
    assert_eq!(response.provider_used, "ollama");
    assert_eq!(response.metadata.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model 'llama3' not found"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(&settings(&server)).unwrap();
    let err = adapter.generate_response(LLMRequest::new("ping")).await.unwrap_err();
    match err {
        LLMError::Provider(msg) => assert!(msg.contains("not found"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried_until_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(&settings(&server)).unwrap();
    assert!(adapter.generate_response(LLMRequest::new("ping")).await.is_err());
}

#[tokio::test]
async fn synthesizer_sends_schema_context_and_extracts_statement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "Here you go:\n```sql\nSELECT e.JobTitle, e.VacationHours FROM HumanResources.Employee e ORDER BY 2 DESC LIMIT 5;\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = Arc::new(OllamaAdapter::new(&settings(&server)).unwrap());
    let retriever = Arc::new(StaticSchemaRetriever::new(vec![TableDdl {
        schema: "HumanResources".into(),
        table: "Employee".into(),
        ddl: "CREATE TABLE HumanResources.Employee (\n  JobTitle text NOT NULL,\n  VacationHours smallint NOT NULL,\n);".into(),
    }]));
    let synthesizer = LlmQuerySynthesizer::new(adapter, retriever);
    let query = synthesizer
        .synthesize("Top 5 employees by vacation hours", Some("execution error: boom"))
        .await
        .unwrap();
    assert_eq!(
        query,
        "SELECT e.JobTitle, e.VacationHours FROM HumanResources.Employee e ORDER BY 2 DESC LIMIT 5"
    );

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = received[0].body_json().unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("CREATE TABLE HumanResources.Employee"));
    assert!(prompt.contains("execution error: boom"));
}

#[tokio::test]
async fn synthesizer_rejects_a_reply_without_a_statement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            "I'm not sure which table holds that. Could you select a narrower question?",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = Arc::new(OllamaAdapter::new(&settings(&server)).unwrap());
    let synthesizer = LlmQuerySynthesizer::new(adapter, Arc::new(StaticSchemaRetriever::new(Vec::new())));
    let result = synthesizer.synthesize("What did we sell?", None).await;
    assert!(matches!(result, Err(SynthesisError::EmptyQuery)));
}
