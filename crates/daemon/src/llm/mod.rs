use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::GeminiConfig;
use crate::error::ChatError;

/// A generative text model: one prompt in, one reply text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Gemini `generateContent` over plain HTTPS.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(GeminiClient {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/models/{}:generateContent", self.api_base, self.model)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a generateContent response.
pub fn candidate_text(response: &serde_json::Value) -> Option<&str> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        candidate_text(&body)
            .map(str::to_string)
            .ok_or(ChatError::EmptyReply)
    }
}
