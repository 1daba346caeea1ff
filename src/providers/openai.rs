use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChatRequest, LLMProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Models offered by `/model select`.
pub const AVAILABLE_MODELS: &[&str] = &["llama3-70b-8192", "llama3-8b-8192", "mixtral-8x7b"];

/// Client for any OpenAI-compatible `chat/completions` endpoint (Groq by default).
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": false
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API error ({}): {}", status, error_text));
        }

        let json_response: serde_json::Value = response.json().await?;

        let content = json_response
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| anyhow::anyhow!("Response contained no message content"))?;

        if content.trim().is_empty() {
            return Err(anyhow::anyhow!("Response content was empty"));
        }

        Ok(content.to_string())
    }

    fn get_models(&self) -> Vec<String> {
        AVAILABLE_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn get_name(&self) -> &str {
        "openai"
    }
}
