//! LLM completion client
//!
//! Supports an Ollama-compatible API for chunk normalization and fact
//! extraction. Every request carries a client-level timeout so a hung
//! completion fails the calling stage instead of stalling the pipeline.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// LLM client for completion calls
#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    system: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)]
    #[serde(default)]
    done: bool,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    /// Check if the LLM service is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run one completion with a system prompt and a user prompt
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            system: system.to_string(),
            prompt: user.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!(model = %self.config.model, "LLM completion request");

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("HTTP {}: {}", status, body)));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Invalid response: {}", e)))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(Error::Llm("Empty completion response".to_string()));
        }

        Ok(text)
    }
}
