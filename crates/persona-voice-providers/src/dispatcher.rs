//! Voice synthesis dispatcher.
//!
//! Validates a [`SynthesisRequest`] against the character table and the
//! provider registry, then makes exactly one call to the requested provider.
//! It never retries; fallback lives in [`crate::fallback`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use persona_voice_core::character::CharacterTable;
use persona_voice_core::config::AppConfig;
use persona_voice_core::voice::{ProviderAvailability, VoiceProvider};

use crate::elevenlabs::ElevenLabsSynthesizer;
use crate::openai::OpenAiSynthesizer;
use crate::playht::PlayHtSynthesizer;
use crate::{AudioClip, SpeechSynthesizer, SynthesisError, SynthesisRequest};

pub struct VoiceDispatcher {
    characters: Arc<CharacterTable>,
    availability: ProviderAvailability,
    synthesizers: HashMap<VoiceProvider, Arc<dyn SpeechSynthesizer>>,
}

impl VoiceDispatcher {
    /// Create a dispatcher with no synthesizers registered.
    pub fn new(characters: Arc<CharacterTable>, availability: ProviderAvailability) -> Self {
        Self {
            characters,
            availability,
            synthesizers: HashMap::new(),
        }
    }

    /// Build a dispatcher with a synthesizer for every provider that has credentials.
    pub fn from_config(app: &AppConfig, client: reqwest::Client) -> Self {
        let providers = &app.config.providers;
        let creds = &app.credentials;
        let mut dispatcher = Self::new(Arc::new(app.characters.clone()), app.availability);

        if let Some(key) = &creds.elevenlabs {
            dispatcher.register(Arc::new(ElevenLabsSynthesizer::new(
                client.clone(),
                key.clone(),
                &providers.elevenlabs,
            )));
        }
        if let Some(playht) = &creds.playht {
            dispatcher.register(Arc::new(PlayHtSynthesizer::new(
                client.clone(),
                playht.clone(),
                &providers.playht,
            )));
        }
        if let Some(key) = &creds.openai {
            dispatcher.register(Arc::new(OpenAiSynthesizer::new(
                client,
                key.clone(),
                &providers.openai,
            )));
        }

        dispatcher
    }

    pub fn register(&mut self, synthesizer: Arc<dyn SpeechSynthesizer>) {
        self.synthesizers.insert(synthesizer.provider(), synthesizer);
    }

    pub fn characters(&self) -> &CharacterTable {
        &self.characters
    }

    /// Effective availability: credentials present and a synthesizer registered.
    pub fn availability(&self) -> ProviderAvailability {
        let flag = |p: VoiceProvider| {
            self.availability.is_available(p) && self.synthesizers.contains_key(&p)
        };
        ProviderAvailability::new(
            flag(VoiceProvider::ElevenLabs),
            flag(VoiceProvider::PlayHt),
            flag(VoiceProvider::OpenAi),
        )
    }

    pub fn is_available(&self, provider: VoiceProvider) -> bool {
        self.availability().is_available(provider)
    }

    /// Check text and character before any external call.
    pub fn validate(&self, text: &str, character_id: &str) -> Result<(), SynthesisError> {
        if text.trim().is_empty() || character_id.trim().is_empty() {
            return Err(SynthesisError::Validation(
                "Text and character ID are required".into(),
            ));
        }
        if !self.characters.contains(character_id) {
            return Err(SynthesisError::Validation(format!(
                "Character not found: {character_id}"
            )));
        }
        Ok(())
    }

    /// Synthesize through exactly one provider.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioClip, SynthesisError> {
        self.validate(&request.text, &request.character_id)?;

        let provider = request.provider;
        if !self.availability.is_available(provider) {
            return Err(SynthesisError::ProviderUnavailable(provider));
        }
        let Some(synthesizer) = self.synthesizers.get(&provider) else {
            return Err(SynthesisError::ProviderUnavailable(provider));
        };
        let voice_id = self
            .characters
            .voice_for(&request.character_id, provider)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                SynthesisError::Validation(format!(
                    "Character {} has no {} voice",
                    request.character_id,
                    provider.display_name()
                ))
            })?;

        let started = Instant::now();
        match synthesizer.synthesize(&request.text, voice_id).await {
            Ok(bytes) => {
                info!(
                    %provider,
                    character = %request.character_id,
                    bytes = bytes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Speech synthesized"
                );
                Ok(AudioClip::mpeg(provider, bytes))
            }
            Err(e) => {
                warn!(%provider, character = %request.character_id, %e, "Speech synthesis failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;

    /// In-process synthesizer that records calls and fails on demand.
    pub(crate) struct MockSynthesizer {
        pub provider: VoiceProvider,
        pub fail: bool,
        pub calls: AtomicUsize,
        pub last_voice: std::sync::Mutex<Option<String>>,
    }

    impl MockSynthesizer {
        pub(crate) fn new(provider: VoiceProvider, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                provider,
                fail,
                calls: AtomicUsize::new(0),
                last_voice: std::sync::Mutex::new(None),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynthesizer {
        fn provider(&self) -> VoiceProvider {
            self.provider
        }

        async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_voice.lock().unwrap() = Some(voice_id.to_string());
            if self.fail {
                Err(SynthesisError::failed(self.provider, "mock failure"))
            } else {
                Ok(Bytes::from(format!("{}:{voice_id}:{text}", self.provider)))
            }
        }
    }

    pub(crate) fn dispatcher_with(
        availability: ProviderAvailability,
        mocks: &[Arc<MockSynthesizer>],
    ) -> VoiceDispatcher {
        let mut d = VoiceDispatcher::new(Arc::new(CharacterTable::builtin()), availability);
        for m in mocks {
            d.register(m.clone());
        }
        d
    }

    fn request(text: &str, character: &str, provider: VoiceProvider) -> SynthesisRequest {
        SynthesisRequest {
            text: text.into(),
            character_id: character.into(),
            provider,
        }
    }

    #[tokio::test]
    async fn test_every_character_and_provider_returns_audio() {
        let mocks: Vec<_> = VoiceProvider::ALL
            .iter()
            .map(|p| MockSynthesizer::new(*p, false))
            .collect();
        let d = dispatcher_with(ProviderAvailability::all(), &mocks);

        let ids: Vec<String> = d.characters().ids().map(String::from).collect();
        for id in &ids {
            for provider in VoiceProvider::ALL {
                let clip = d.synthesize(&request("Hello", id, provider)).await.unwrap();
                assert!(!clip.is_empty());
                assert_eq!(clip.provider, provider);
                assert_eq!(clip.content_type, "audio/mpeg");
            }
        }
    }

    #[tokio::test]
    async fn test_uses_character_voice_for_provider() {
        let mock = MockSynthesizer::new(VoiceProvider::OpenAi, false);
        let d = dispatcher_with(ProviderAvailability::all(), &[mock.clone()]);
        d.synthesize(&request("Hi", "hermione", VoiceProvider::OpenAi))
            .await
            .unwrap();
        assert_eq!(mock.last_voice.lock().unwrap().as_deref(), Some("nova"));
    }

    #[tokio::test]
    async fn test_empty_voice_is_rejected_before_call() {
        use persona_voice_core::character::{Character, VoiceIds};

        let mute = Character {
            id: "mute".into(),
            name: "Mute".into(),
            description: String::new(),
            personality: String::new(),
            system_prompt: "You say little.".into(),
            voices: VoiceIds {
                elevenlabs: "el-voice".into(),
                playht: "ph-voice".into(),
                openai: String::new(),
            },
        };
        let mock = MockSynthesizer::new(VoiceProvider::OpenAi, false);
        let mut d = VoiceDispatcher::new(
            Arc::new(CharacterTable::from_characters([mute])),
            ProviderAvailability::all(),
        );
        d.register(mock.clone());

        let err = d
            .synthesize(&request("Hello", "mute", VoiceProvider::OpenAi))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Validation(msg) if msg.contains("OpenAI")));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_happens_before_call() {
        let mock = MockSynthesizer::new(VoiceProvider::ElevenLabs, false);
        let d = dispatcher_with(ProviderAvailability::all(), &[mock.clone()]);

        let err = d
            .synthesize(&request("  ", "sherlock", VoiceProvider::ElevenLabs))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Validation(_)));

        let err = d
            .synthesize(&request("Hello", "moriarty", VoiceProvider::ElevenLabs))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Validation(msg) if msg.contains("moriarty")));

        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_not_called() {
        let mock = MockSynthesizer::new(VoiceProvider::ElevenLabs, false);
        let d = dispatcher_with(ProviderAvailability::new(false, true, true), &[mock.clone()]);

        let err = d
            .synthesize(&request("Hello", "sherlock", VoiceProvider::ElevenLabs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::ProviderUnavailable(VoiceProvider::ElevenLabs)
        ));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let mock = MockSynthesizer::new(VoiceProvider::PlayHt, true);
        let d = dispatcher_with(ProviderAvailability::all(), &[mock.clone()]);
        let err = d
            .synthesize(&request("Hello", "yoda", VoiceProvider::PlayHt))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Failed { provider: VoiceProvider::PlayHt, .. }));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_availability_requires_registration() {
        let d = dispatcher_with(ProviderAvailability::all(), &[]);
        assert!(!d.availability().any());
    }
}
