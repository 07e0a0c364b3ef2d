//! Chat-completion language model abstraction.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::OpenAIConfig;
use crate::models::Credential;
use crate::openai::OpenAIClient;

/// A text-in, text-out language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, credential: &Credential, prompt: &str) -> Result<String>;
}

/// [`ChatModel`] backed by `POST /chat/completions`.
pub struct OpenAIChatModel {
    client: OpenAIClient,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    pub fn new(client: OpenAIClient, config: &OpenAIConfig) -> Self {
        Self {
            client,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, credential: &Credential, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let json = self
            .client
            .post_json(credential, "chat/completions", &body)
            .await?;

        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}
