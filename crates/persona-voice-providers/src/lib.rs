//! Speech synthesis providers and the voice dispatch layer.
//!
//! Each vendor implements the [`SpeechSynthesizer`] trait. The
//! [`VoiceDispatcher`] validates a request against the character table and
//! routes it to one provider; [`fallback`] walks the providers in a fixed
//! cyclic order when a provider fails or is not configured.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use persona_voice_core::voice::VoiceProvider;

pub mod chat;
pub mod dispatcher;
pub mod elevenlabs;
pub mod fallback;
pub mod openai;
pub mod playht;

pub use chat::{ChatClient, ChatError};
pub use dispatcher::VoiceDispatcher;
pub use fallback::{Attempt, AttemptOutcome, FallbackOutcome, FallbackSelector, SelectorState};

/// Content type of every clip the gateway returns.
pub const AUDIO_MPEG: &str = "audio/mpeg";

/// A request to speak `text` in a character's voice through one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub character_id: String,
    pub provider: VoiceProvider,
}

/// Synthesized audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub provider: VoiceProvider,
    pub bytes: Bytes,
    pub content_type: &'static str,
}

impl AudioClip {
    pub fn mpeg(provider: VoiceProvider, bytes: Bytes) -> Self {
        Self {
            provider,
            bytes,
            content_type: AUDIO_MPEG,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// The request is malformed; no provider was called.
    #[error("{0}")]
    Validation(String),

    /// Credentials for the provider are absent.
    #[error("{} is not configured", .0.display_name())]
    ProviderUnavailable(VoiceProvider),

    /// The upstream call failed.
    #[error("{} synthesis failed: {cause}", provider.display_name())]
    Failed {
        provider: VoiceProvider,
        cause: String,
    },

    /// Every provider in the fallback chain was visited without success.
    #[error("All voice providers failed: {}", fallback::describe_attempts(attempts))]
    Exhausted { attempts: Vec<Attempt> },
}

impl SynthesisError {
    pub fn failed(provider: VoiceProvider, cause: impl ToString) -> Self {
        Self::Failed {
            provider,
            cause: cause.to_string(),
        }
    }

    /// Whether the fallback selector should move on to the next provider.
    pub fn is_retryable_elsewhere(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Failed { .. })
    }
}

/// A vendor text-to-speech API.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Which provider this is.
    fn provider(&self) -> VoiceProvider;

    /// Speak `text` with the vendor voice `voice_id`, returning MP3 bytes.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError>;
}

/// Turn a vendor HTTP response into audio bytes, or a `Failed` error naming the provider.
pub(crate) async fn read_audio(
    provider: VoiceProvider,
    resp: reqwest::Response,
) -> Result<Bytes, SynthesisError> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(SynthesisError::failed(
            provider,
            format!("API error ({status}): {}", truncate(&body, 300)),
        ));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| SynthesisError::failed(provider, e))?;

    if bytes.is_empty() {
        return Err(SynthesisError::failed(provider, "empty audio response"));
    }
    Ok(bytes)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_provider() {
        let err = SynthesisError::failed(VoiceProvider::PlayHt, "timeout");
        assert_eq!(err.to_string(), "PlayHT synthesis failed: timeout");

        let err = SynthesisError::ProviderUnavailable(VoiceProvider::ElevenLabs);
        assert_eq!(err.to_string(), "ElevenLabs is not configured");
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!SynthesisError::Validation("bad".into()).is_retryable_elsewhere());
        assert!(SynthesisError::ProviderUnavailable(VoiceProvider::OpenAi).is_retryable_elsewhere());
        assert!(SynthesisError::failed(VoiceProvider::OpenAi, "x").is_retryable_elsewhere());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
