//! Speech-to-text from uploaded audio bytes.

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use persona_voice_core::config::OpenAiConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("No audio file provided")]
    EmptyAudio,

    #[error("OpenAI is not configured")]
    NotConfigured,

    #[error("Transcription API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Whisper-compatible transcription client.
pub struct Transcriber {
    url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl Transcriber {
    pub fn new(client: reqwest::Client, api_key: Option<String>, config: &OpenAiConfig) -> Self {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/');
        Self {
            url: format!("{base}/v1/audio/transcriptions"),
            api_key,
            model: config.stt_model.clone(),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Transcribe an uploaded clip. `file_name` and `mime` describe the upload
    /// so the API can detect the container format.
    pub async fn transcribe(
        &self,
        audio: Bytes,
        file_name: &str,
        mime: &str,
    ) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(TranscriptionError::NotConfigured)?;

        debug!(url = %self.url, model = %self.model, bytes = audio.len(), "Sending audio for transcription");

        let mime = if mime.contains('/') {
            mime
        } else {
            "application/octet-stream"
        };
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api { status, body });
        }

        let text = resp.text().await?;
        Ok(text.trim().to_string())
    }
}
