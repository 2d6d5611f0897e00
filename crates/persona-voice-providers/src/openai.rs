//! OpenAI speech API (`/v1/audio/speech`).

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use persona_voice_core::config::OpenAiConfig;
use persona_voice_core::voice::VoiceProvider;

use crate::{read_audio, SpeechSynthesizer, SynthesisError};

pub(crate) const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiSynthesizer {
    pub fn new(client: reqwest::Client, api_key: String, config: &OpenAiConfig) -> Self {
        Self {
            base_url: openai_base_url(config),
            api_key,
            model: config.tts_model.clone(),
            client,
        }
    }
}

pub(crate) fn openai_base_url(config: &OpenAiConfig) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or(OPENAI_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    fn provider(&self) -> VoiceProvider {
        VoiceProvider::OpenAi
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        debug!(voice = voice_id, model = %self.model, text_len = text.len(), "OpenAI speech request");

        let resp = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice: voice_id,
                input: text,
                response_format: "mp3",
            })
            .send()
            .await
            .map_err(|e| SynthesisError::failed(VoiceProvider::OpenAi, e))?;

        read_audio(VoiceProvider::OpenAi, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_synthesize_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "tts-1",
                "voice": "alloy",
                "input": "Elementary",
                "response_format": "mp3"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let config = OpenAiConfig {
            base_url: Some(server.uri()),
            ..OpenAiConfig::default()
        };
        let synth = OpenAiSynthesizer::new(reqwest::Client::new(), "sk-test".into(), &config);
        let audio = synth.synthesize("Elementary", "alloy").await.unwrap();
        assert_eq!(&audio[..], b"mp3");
    }

    #[tokio::test]
    async fn test_connection_error_is_failure() {
        let config = OpenAiConfig {
            // Nothing listens on port 9 locally
            base_url: Some("http://127.0.0.1:9".into()),
            ..OpenAiConfig::default()
        };
        let synth = OpenAiSynthesizer::new(reqwest::Client::new(), "sk-test".into(), &config);
        let err = synth.synthesize("hi", "alloy").await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Failed { provider: VoiceProvider::OpenAi, .. }
        ));
    }
}
