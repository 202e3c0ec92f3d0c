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

use super::core::LLMAdapter;
use async_trait::async_trait;
use llm_contracts::{LLMError, LLMRequest, LLMResponse, LLMResult, LlmSettings, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaAdapter {
    pub fn new(settings: &LlmSettings) -> LLMResult<Self> {
        settings.validate().map_err(LLMError::Configuration)?;
        let timeout = Duration::from_secs(settings.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout,
            max_retries: settings.max_retries,
        })
    }

    fn build_payload(&self, request: &LLMRequest) -> Value {
        let config = &request.generation_config;
        let mut options = json!({
            "temperature": config.temperature.unwrap_or(self.temperature)
        });
        if let Some(max_tokens) = config.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }
        if let Some(top_p) = config.top_p {
            options["top_p"] = json!(top_p);
        }
        if let Some(stop) = &config.stop_sequences {
            options["stop"] = json!(stop);
        }
        json!({
            "model": self.model,
            "messages": request.messages(),
            "stream": false,
            "options": options
        })
    }

    fn parse_response(&self, request: &LLMRequest, data: &Value) -> LLMResult<LLMResponse> {
        let content = data["message"]["content"].as_str().ok_or_else(|| {
            LLMError::Provider("Failed to extract content from Ollama response".to_string())
        })?;
        let mut response = LLMResponse::new(request.id, content.to_string(), &self.model, "ollama");
        response.usage = Usage::new(
            data["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            data["eval_count"].as_u64().unwrap_or(0) as u32,
        );
        if data["done"].as_bool().unwrap_or(false) {
            response.metadata.finish_reason = Some("stop".to_string());
        }
        Ok(response)
    }

    async fn post_with_retry(&self, endpoint: &str, payload: &Value) -> LLMResult<(Value, u32)> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            debug!(attempt = attempt + 1, max_attempts = self.max_retries + 1, "Sending request to Ollama");
            let sent = tokio::time::timeout(self.timeout, self.client.post(&url).json(payload).send()).await;
            let error = match sent {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map(|data| (data, attempt))
                        .map_err(|e| LLMError::Serialisation(format!("Failed to parse JSON response: {e}")));
                }
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let error = LLMError::Provider(format!("Ollama API error {status}: {body}"));
                    if status.is_client_error() {
                        return Err(error);
                    }
                    error
                }
                Ok(Err(e)) if e.is_timeout() => LLMError::Timeout(self.timeout.as_secs()),
                Ok(Err(e)) => LLMError::Network(format!("Request failed: {e}")),
                Err(_) => {
                    warn!(timeout = ?self.timeout, "Request to Ollama timed out");
                    LLMError::Timeout(self.timeout.as_secs())
                }
            };
            warn!(attempt = attempt + 1, error = %error, "Ollama request failed");
            last_error = Some(error);
            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt.min(3)))).await;
            }
        }
        Err(last_error.unwrap_or_else(|| LLMError::Internal("Unknown error".to_string())))
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    #[instrument(skip(self, request), fields(model = %self.model, request_id = %request.id))]
    async fn generate_response(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let started = Instant::now();
        let payload = self.build_payload(&request);
        let (data, retries) = self.post_with_retry("/api/chat", &payload).await?;
        let mut response = self.parse_response(&request, &data)?;
        response.metadata.processing_time_ms = started.elapsed().as_millis() as u64;
        response.metadata.retry_count = retries;
        info!(
            tokens = response.usage.total_tokens,
            elapsed_ms = response.metadata.processing_time_ms,
            "Received Ollama response"
        );
        Ok(response)
    }

    async fn health_check(&self) -> LLMResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LLMError::Network(format!("Ollama unreachable: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(LLMError::Provider(format!("Ollama health check returned {}", resp.status())))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
