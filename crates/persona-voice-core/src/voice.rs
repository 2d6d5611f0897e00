//! Voice provider registry.
//!
//! A static table of the speech synthesis vendors the gateway knows about,
//! their capabilities, and which of them have credentials in this process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PersonaVoiceError;

/// A third-party speech synthesis vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoiceProvider {
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    #[serde(rename = "playht")]
    PlayHt,
    #[serde(rename = "openai")]
    OpenAi,
}

/// How a provider expects its credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `xi-api-key: <key>`
    XiApiKey,
    /// `X-USER-ID: <user>` plus `AUTHORIZATION: <key>`
    UserIdAndKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

/// Shape of the per-character voice identifier a provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceIdFormat {
    /// Opaque vendor voice id (e.g. `21m00Tcm4TlvDq8ikWAM`).
    Opaque,
    /// S3 manifest URL of a cloned or stock voice.
    ManifestUrl,
    /// One of a small set of preset voice names (e.g. `alloy`).
    PresetName,
}

/// Static capability record for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapability {
    pub auth: AuthScheme,
    pub voice_id_format: VoiceIdFormat,
    /// Environment variables that must be set for the provider to be available.
    pub required_env: &'static [&'static str],
}

impl VoiceProvider {
    /// Fixed cyclic priority order used for selection and fallback.
    pub const ALL: [VoiceProvider; 3] = [Self::ElevenLabs, Self::PlayHt, Self::OpenAi];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElevenLabs => "elevenlabs",
            Self::PlayHt => "playht",
            Self::OpenAi => "openai",
        }
    }

    /// Human-readable vendor name for logs and CLI output.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::ElevenLabs => "ElevenLabs",
            Self::PlayHt => "PlayHT",
            Self::OpenAi => "OpenAI",
        }
    }

    /// Position of this provider in [`VoiceProvider::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::ElevenLabs => 0,
            Self::PlayHt => 1,
            Self::OpenAi => 2,
        }
    }

    pub const fn capability(self) -> ProviderCapability {
        match self {
            Self::ElevenLabs => ProviderCapability {
                auth: AuthScheme::XiApiKey,
                voice_id_format: VoiceIdFormat::Opaque,
                required_env: &["ELEVENLABS_API_KEY"],
            },
            Self::PlayHt => ProviderCapability {
                auth: AuthScheme::UserIdAndKey,
                voice_id_format: VoiceIdFormat::ManifestUrl,
                required_env: &["PLAYHT_API_KEY", "PLAYHT_USER_ID"],
            },
            Self::OpenAi => ProviderCapability {
                auth: AuthScheme::Bearer,
                voice_id_format: VoiceIdFormat::PresetName,
                required_env: &["OPENAI_API_KEY"],
            },
        }
    }
}

impl fmt::Display for VoiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceProvider {
    type Err = PersonaVoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Self::ElevenLabs),
            "playht" => Ok(Self::PlayHt),
            "openai" => Ok(Self::OpenAi),
            other => Err(PersonaVoiceError::UnknownProvider(other.to_string())),
        }
    }
}

/// Which providers have credentials. Computed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderAvailability {
    flags: [bool; 3],
}

impl ProviderAvailability {
    pub fn new(elevenlabs: bool, playht: bool, openai: bool) -> Self {
        Self {
            flags: [elevenlabs, playht, openai],
        }
    }

    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_available(&self, provider: VoiceProvider) -> bool {
        self.flags[provider.index()]
    }

    /// Available providers in priority order.
    pub fn available(&self) -> impl Iterator<Item = VoiceProvider> + '_ {
        VoiceProvider::ALL
            .into_iter()
            .filter(|p| self.is_available(*p))
    }

    pub fn first_available(&self) -> Option<VoiceProvider> {
        self.available().next()
    }

    pub fn any(&self) -> bool {
        self.flags.iter().any(|f| *f)
    }
}

impl Serialize for ProviderAvailability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(VoiceProvider::ALL.len()))?;
        for provider in VoiceProvider::ALL {
            map.serialize_entry(provider.as_str(), &self.is_available(provider))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_ids() {
        assert_eq!("elevenlabs".parse::<VoiceProvider>().unwrap(), VoiceProvider::ElevenLabs);
        assert_eq!("PlayHT".parse::<VoiceProvider>().unwrap(), VoiceProvider::PlayHt);
        assert_eq!(" openai ".parse::<VoiceProvider>().unwrap(), VoiceProvider::OpenAi);
        assert!(matches!(
            "polly".parse::<VoiceProvider>(),
            Err(PersonaVoiceError::UnknownProvider(id)) if id == "polly"
        ));
    }

    #[test]
    fn test_order_matches_index() {
        for (i, provider) in VoiceProvider::ALL.iter().enumerate() {
            assert_eq!(provider.index(), i);
        }
    }

    #[test]
    fn test_playht_needs_two_credentials() {
        let cap = VoiceProvider::PlayHt.capability();
        assert_eq!(cap.auth, AuthScheme::UserIdAndKey);
        assert_eq!(cap.required_env.len(), 2);
    }

    #[test]
    fn test_availability_first_available() {
        let avail = ProviderAvailability::new(false, true, true);
        assert_eq!(avail.first_available(), Some(VoiceProvider::PlayHt));
        assert_eq!(
            avail.available().collect::<Vec<_>>(),
            vec![VoiceProvider::PlayHt, VoiceProvider::OpenAi]
        );
        assert_eq!(ProviderAvailability::none().first_available(), None);
        assert!(!ProviderAvailability::none().any());
    }

    #[test]
    fn test_availability_serializes_as_flag_map() {
        let avail = ProviderAvailability::new(true, false, true);
        let json = serde_json::to_value(avail).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"elevenlabs": true, "playht": false, "openai": true})
        );
    }

    #[test]
    fn test_provider_serde_roundtrip_id() {
        let json = serde_json::to_string(&VoiceProvider::PlayHt).unwrap();
        assert_eq!(json, "\"playht\"");
    }
}
