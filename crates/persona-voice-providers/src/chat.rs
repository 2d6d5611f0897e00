//! In-character chat via OpenAI Chat Completions (non-streaming).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use persona_voice_core::character::Character;
use persona_voice_core::config::OpenAiConfig;

use crate::openai::openai_base_url;
use crate::truncate;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message and character ID are required")]
    MissingInput,

    #[error("OpenAI is not configured")]
    NotConfigured,

    #[error("Chat request failed: {0}")]
    Upstream(String),

    #[error("Chat response contained no message")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generates a reply in a character's persona.
pub struct ChatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>, config: &OpenAiConfig) -> Self {
        Self {
            base_url: openai_base_url(config),
            api_key,
            model: config.chat_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model to answer `message` as `character`.
    pub async fn reply(&self, character: &Character, message: &str) -> Result<String, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::MissingInput);
        }
        let api_key = self.api_key.as_deref().ok_or(ChatError::NotConfigured)?;

        debug!(
            character = %character.id,
            model = %self.model,
            message_len = message.len(),
            "Chat completion request"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &character.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Upstream(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Upstream(format!(
                "API error ({status}): {}",
                truncate(&body, 300)
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::Upstream(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}
