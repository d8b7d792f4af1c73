//! OpenAI-compatible chat completion client used for triple extraction,
//! relationship inference and community summaries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{with_timeout, CompletionModel, Service};
use crate::config::LlmSettings;
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAIClient {
    /// Create client with API key.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("graphrag/0.1.0")
            .build()
            .map_err(|e| Error::Config(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        })
    }

    /// Create client from the `llm` config section.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let mut client = Self::new(settings.api_key.clone())?;
        client.base_url = settings.base_url.trim_end_matches('/').to_string();
        client.model = settings.model.clone();
        client.timeout = settings.timeout;
        client.max_retries = settings.max_retries.max(1);
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };
        let (status, text) = self.post_chat(&request).await?;
        parse_reply(status, &text)
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<(StatusCode, String)> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::CompletionError(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::CompletionError(format!("Failed to read response: {}", e)))?;
        Ok((status, text))
    }
}

fn parse_reply(status: StatusCode, text: &str) -> Result<String> {
    if !status.is_success() {
        return Err(Error::CompletionError(format!(
            "OpenAI error {}: {}",
            status, text
        )));
    }

    let chat_response: ChatResponse = serde_json::from_str(text)
        .map_err(|e| Error::CompletionError(format!("Invalid response: {}", e)))?;

    chat_response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| Error::CompletionError("Empty response from OpenAI".to_string()))
}

/// Statuses retried by `complete`: 429 and 5xx.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl CompletionModel for OpenAIClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: Some(system_prompt.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: Some(user_prompt.to_string()),
            },
        ];

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        };

        let mut last_err = None;
        for attempt in 1..=self.max_retries {
            // Stays None for transport failures and timeouts.
            let mut status = None;
            let call = async {
                let (code, text) = self.post_chat(&request).await?;
                status = Some(code);
                parse_reply(code, &text)
            };
            match with_timeout(Service::Completion, self.timeout, call).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    warn!(
                        "Completion attempt {}/{} failed: {}",
                        attempt, self.max_retries, err
                    );
                    if status.is_some_and(|code| !is_transient(code)) {
                        return Err(err);
                    }
                    last_err = Some(err);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::CompletionError("no attempts made".to_string())))
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
