//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use persona_voice_core::config::ElevenLabsConfig;
use persona_voice_core::voice::VoiceProvider;

use crate::{read_audio, SpeechSynthesizer, SynthesisError, AUDIO_MPEG};

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

pub struct ElevenLabsSynthesizer {
    base_url: String,
    api_key: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(client: reqwest::Client, api_key: String, config: &ElevenLabsConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(ELEVENLABS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            client,
        }
    }

    fn url(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{voice_id}", self.base_url)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn provider(&self) -> VoiceProvider {
        VoiceProvider::ElevenLabs
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        debug!(voice_id, model = %self.model_id, text_len = text.len(), "ElevenLabs request");

        let resp = self
            .client
            .post(self.url(voice_id))
            .header("xi-api-key", &self.api_key)
            .header("Accept", AUDIO_MPEG)
            .json(&json!({
                "text": text,
                "model_id": self.model_id,
                "voice_settings": {
                    "stability": self.stability,
                    "similarity_boost": self.similarity_boost,
                }
            }))
            .send()
            .await
            .map_err(|e| SynthesisError::failed(VoiceProvider::ElevenLabs, e))?;

        read_audio(VoiceProvider::ElevenLabs, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synth(base_url: &str) -> ElevenLabsSynthesizer {
        let config = ElevenLabsConfig {
            base_url: Some(format!("{base_url}/")),
            ..ElevenLabsConfig::default()
        };
        ElevenLabsSynthesizer::new(reqwest::Client::new(), "el-key".into(), &config)
    }

    #[test]
    fn test_url_uses_voice_id() {
        let s = synth("https://example.test");
        assert_eq!(
            s.url("21m00Tcm4TlvDq8ikWAM"),
            "https://example.test/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM"
        );
    }

    #[tokio::test]
    async fn test_synthesize_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(header("xi-api-key", "el-key"))
            .and(body_partial_json(json!({
                "text": "Hello",
                "model_id": "eleven_monolingual_v1",
                "voice_settings": { "stability": 0.5, "similarity_boost": 0.5 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3-audio".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let audio = synth(&server.uri()).synthesize("Hello", "voice-1").await.unwrap();
        assert_eq!(&audio[..], b"ID3-audio");
    }

    #[tokio::test]
    async fn test_non_success_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = synth(&server.uri()).synthesize("Hello", "voice-1").await.unwrap_err();
        match err {
            SynthesisError::Failed { provider, cause } => {
                assert_eq!(provider, VoiceProvider::ElevenLabs);
                assert!(cause.contains("401"));
                assert!(cause.contains("invalid api key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
