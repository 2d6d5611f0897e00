//! PlayHT text-to-speech.
//!
//! Uses the v2 streaming endpoint, which returns the whole MP3 body in one
//! response. Auth is the `X-USER-ID` + `AUTHORIZATION` header pair.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use persona_voice_core::config::{PlayHtConfig, PlayHtCredentials};
use persona_voice_core::voice::VoiceProvider;

use crate::{read_audio, SpeechSynthesizer, SynthesisError, AUDIO_MPEG};

const PLAYHT_BASE_URL: &str = "https://api.play.ht";

pub struct PlayHtSynthesizer {
    base_url: String,
    credentials: PlayHtCredentials,
    voice_engine: String,
    client: reqwest::Client,
}

impl PlayHtSynthesizer {
    pub fn new(
        client: reqwest::Client,
        credentials: PlayHtCredentials,
        config: &PlayHtConfig,
    ) -> Self {
        Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(PLAYHT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            credentials,
            voice_engine: config.voice_engine.clone(),
            client,
        }
    }

    fn request_body(&self, text: &str, voice_id: &str) -> serde_json::Value {
        json!({
            "text": text,
            "voice": voice_id,
            "voice_engine": self.voice_engine,
            "output_format": "mp3",
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for PlayHtSynthesizer {
    fn provider(&self) -> VoiceProvider {
        VoiceProvider::PlayHt
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        debug!(voice_id, engine = %self.voice_engine, text_len = text.len(), "PlayHT request");

        let resp = self
            .client
            .post(format!("{}/api/v2/tts/stream", self.base_url))
            .header("X-USER-ID", &self.credentials.user_id)
            .header("AUTHORIZATION", &self.credentials.api_key)
            .header("Accept", AUDIO_MPEG)
            .json(&self.request_body(text, voice_id))
            .send()
            .await
            .map_err(|e| SynthesisError::failed(VoiceProvider::PlayHt, e))?;

        read_audio(VoiceProvider::PlayHt, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synth(base_url: &str) -> PlayHtSynthesizer {
        let config = PlayHtConfig {
            base_url: Some(base_url.to_string()),
            ..PlayHtConfig::default()
        };
        PlayHtSynthesizer::new(
            reqwest::Client::new(),
            PlayHtCredentials {
                api_key: "ph-key".into(),
                user_id: "ph-user".into(),
            },
            &config,
        )
    }

    #[test]
    fn test_request_body_shape() {
        let body = synth("http://unused").request_body("Hi", "s3://voice/manifest.json");
        assert_eq!(body["voice"], "s3://voice/manifest.json");
        assert_eq!(body["voice_engine"], "Play3.0-mini");
        assert_eq!(body["output_format"], "mp3");
    }

    #[tokio::test]
    async fn test_synthesize_uses_header_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/tts/stream"))
            .and(header("X-USER-ID", "ph-user"))
            .and(header("AUTHORIZATION", "ph-key"))
            .and(body_partial_json(json!({"text": "Hello", "voice": "v"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .expect(1)
            .mount(&server)
            .await;

        let audio = synth(&server.uri()).synthesize("Hello", "v").await.unwrap();
        assert_eq!(audio.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = synth(&server.uri()).synthesize("Hello", "v").await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Failed { provider: VoiceProvider::PlayHt, .. }
        ));
    }
}
