//! Ollama chat client used for narrative summaries.
//!
//! The request is a single non-streaming `/api/chat` call whose `format`
//! field carries the JSON schema the reply must follow.

use super::AnalysisError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Seam between the analyst and whatever service produces text.
pub trait TextGenerator {
    /// Send `prompt`, asking for a reply shaped like `schema`, and return the
    /// raw reply text.
    fn generate(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> impl Future<Output = Result<String, AnalysisError>> + Send;
}

/// Connection settings for the Ollama service.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.2,
            timeout_seconds: 120,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'a Value,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaGenerator {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AnalysisError::Client(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<String, AnalysisError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: schema,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending analysis request to {} ({})", url, self.config.model_name);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(Duration::from_secs(self.config.timeout_seconds))
                } else if e.is_connect() {
                    AnalysisError::Connect(self.config.ollama_url.clone())
                } else {
                    AnalysisError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ResponseParse(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

const SYSTEM_PROMPT: &str = "You are a clinical nursing quality analyst. \
Reply with a single JSON object only, no markdown or commentary.";
