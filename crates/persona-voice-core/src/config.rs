//! Configuration loading, validation, and resolution into an immutable [`AppConfig`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::character::{Character, CharacterTable};
use crate::voice::{ProviderAvailability, VoiceProvider};

/// Top-level Persona Voice configuration, as read from the JSON5 config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaConfig>,

    /// Replaces the built-in character table when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<Character>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Server ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Allowed browser origin. Falls back to `FRONTEND_URL`, then `http://localhost:3000`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origin: Option<String>,

    /// Maximum request body size, including audio uploads (default: 10 MiB).
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Directory with a built browser client, served for non-API paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            cors_origin: None,
            body_limit_bytes: default_body_limit(),
            static_dir: None,
            rate_limit: None,
            tls: None,
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

/// Per-IP request rate limit for `/api/*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Max requests per window (default: 100).
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds (default: 900).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    15 * 60
}

/// TLS configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM).
    pub cert_path: String,
    /// Path to the TLS private key file (PEM).
    pub key_path: String,
}

// --- Voice and chat providers ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,

    #[serde(default)]
    pub playht: PlayHtConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_elevenlabs_model")]
    pub model_id: String,
    #[serde(default = "default_half")]
    pub stability: f32,
    #[serde(default = "default_half")]
    pub similarity_boost: f32,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            base_url: None,
            model_id: default_elevenlabs_model(),
            stability: default_half(),
            similarity_boost: default_half(),
        }
    }
}

fn default_elevenlabs_model() -> String {
    "eleven_monolingual_v1".into()
}

fn default_half() -> f32 {
    0.5
}

impl ElevenLabsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(
            self.api_key.as_deref(),
            Some(self.api_key_env.as_deref().unwrap_or("ELEVENLABS_API_KEY")),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHtConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_playht_engine")]
    pub voice_engine: String,
}

impl Default for PlayHtConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            user_id: None,
            user_id_env: None,
            base_url: None,
            voice_engine: default_playht_engine(),
        }
    }
}

fn default_playht_engine() -> String {
    "Play3.0-mini".into()
}

impl PlayHtConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(
            self.api_key.as_deref(),
            Some(self.api_key_env.as_deref().unwrap_or("PLAYHT_API_KEY")),
        )
    }

    pub fn resolve_user_id(&self) -> Option<String> {
        resolve_secret_field(
            self.user_id.as_deref(),
            Some(self.user_id_env.as_deref().unwrap_or("PLAYHT_USER_ID")),
        )
    }
}

/// OpenAI is used for chat, transcription and the fallback voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            base_url: None,
            tts_model: default_tts_model(),
            chat_model: default_chat_model(),
            stt_model: default_stt_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_tts_model() -> String {
    "tts-1".into()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}

fn default_stt_model() -> String {
    "whisper-1".into()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f64 {
    0.8
}

impl OpenAiConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(
            self.api_key.as_deref(),
            Some(self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")),
        )
    }
}

// --- Hosted event log ---

/// Hosted database (Supabase REST) used for analytics, conversations and clip storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Upload synthesized clips to the `voice-clips` bucket (default: true).
    #[serde(default = "default_true")]
    pub store_voice_clips: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: None,
            api_key: None,
            api_key_env: None,
            store_voice_clips: true,
        }
    }
}

impl AnalyticsConfig {
    pub fn resolve_url(&self) -> Option<String> {
        resolve_secret_field(
            self.url.as_deref(),
            Some(self.url_env.as_deref().unwrap_or("SUPABASE_URL")),
        )
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(
            self.api_key.as_deref(),
            Some(self.api_key_env.as_deref().unwrap_or("SUPABASE_ANON_KEY")),
        )
    }
}

// --- Media ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// ffmpeg binary (default: `ffmpeg` on PATH).
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// MP3 bitrate for processed audio (default: 128).
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            bitrate_kbps: default_bitrate(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".into()
}

fn default_bitrate() -> u32 {
    128
}

// --- Logging ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "persona_voice_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: Option<&str>, env_var: Option<&str>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.to_string());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        debug!(path = %path.display(), "Loading config");
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse JSON5 config text, substituting `${ENV_VAR}` references.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted)
            .map_err(|e| crate::error::PersonaVoiceError::Config(e.to_string()))
    }

    /// Default config file location: `~/.persona_voice/config.json`.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Allowed CORS origin: config, then `FRONTEND_URL`, then the dev default.
    pub fn cors_origin(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.cors_origin.clone())
            .or_else(|| std::env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "http://localhost:3000".to_string())
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        self.server
            .as_ref()
            .and_then(|s| s.rate_limit.clone())
            .unwrap_or_default()
    }

    pub fn media(&self) -> MediaConfig {
        self.media.clone().unwrap_or_default()
    }

    pub fn analytics(&self) -> AnalyticsConfig {
        self.analytics.clone().unwrap_or_default()
    }

    /// The configured character list, or the built-in table.
    pub fn character_table(&self) -> CharacterTable {
        match &self.characters {
            Some(list) => CharacterTable::from_characters(list.iter().cloned()),
            None => CharacterTable::builtin(),
        }
    }

    /// Validate the config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let p = &self.providers;
        if p.elevenlabs.resolve_api_key().is_none() {
            warnings.push("Voice provider 'elevenlabs' has no API key configured".to_string());
        }
        if p.playht.resolve_api_key().is_none() || p.playht.resolve_user_id().is_none() {
            warnings.push(
                "Voice provider 'playht' needs both an API key and a user id".to_string(),
            );
        }
        if p.openai.resolve_api_key().is_none() {
            warnings.push(
                "Provider 'openai' has no API key configured (chat and transcription disabled)"
                    .to_string(),
            );
        }

        if let Some(characters) = &self.characters {
            if characters.is_empty() {
                warnings.push("Character list is empty".to_string());
            }
            for (i, c) in characters.iter().enumerate() {
                if c.id.trim().is_empty() {
                    errors.push(format!("Character #{i} has an empty id"));
                }
                for provider in VoiceProvider::ALL {
                    if c.voices.get(provider).trim().is_empty() {
                        errors.push(format!(
                            "Character '{}' has no {} voice",
                            c.id,
                            provider.display_name()
                        ));
                    }
                }
            }
        }

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
            if let Some(tls) = &server.tls {
                if !Path::new(&tls.cert_path).exists() {
                    errors.push(format!("TLS cert file not found: {}", tls.cert_path));
                }
                if !Path::new(&tls.key_path).exists() {
                    errors.push(format!("TLS key file not found: {}", tls.key_path));
                }
            }
        }

        (warnings, errors)
    }

    /// Copy of the config with every inline secret masked, for display.
    /// `*_env` references are kept since they only name variables.
    pub fn redacted(&self) -> Self {
        fn mask(field: &mut Option<String>) {
            if field.as_deref().is_some_and(|v| !v.is_empty()) {
                *field = Some(REDACTED.into());
            }
        }

        let mut config = self.clone();
        let p = &mut config.providers;
        mask(&mut p.elevenlabs.api_key);
        mask(&mut p.playht.api_key);
        mask(&mut p.playht.user_id);
        mask(&mut p.openai.api_key);
        if let Some(analytics) = config.analytics.as_mut() {
            mask(&mut analytics.api_key);
        }
        config
    }
}

const REDACTED: &str = "[redacted]";

/// Base directory for Persona Voice data: `~/.persona_voice/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".persona_voice")
}

// --- Resolved configuration ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayHtCredentials {
    pub api_key: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsCredentials {
    pub url: String,
    pub api_key: String,
}

/// Secrets resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub elevenlabs: Option<String>,
    pub playht: Option<PlayHtCredentials>,
    pub openai: Option<String>,
    pub analytics: Option<AnalyticsCredentials>,
}

impl Credentials {
    /// Resolve every secret from the config and the process environment.
    pub fn resolve(config: &Config) -> Self {
        let p = &config.providers;
        let playht = match (p.playht.resolve_api_key(), p.playht.resolve_user_id()) {
            (Some(api_key), Some(user_id)) => Some(PlayHtCredentials { api_key, user_id }),
            _ => None,
        };
        let analytics = config.analytics();
        let analytics = match (analytics.resolve_url(), analytics.resolve_api_key()) {
            (Some(url), Some(api_key)) => Some(AnalyticsCredentials { url, api_key }),
            _ => None,
        };
        Self {
            elevenlabs: p.elevenlabs.resolve_api_key(),
            playht,
            openai: p.openai.resolve_api_key(),
            analytics,
        }
    }

    pub fn availability(&self) -> ProviderAvailability {
        ProviderAvailability::new(
            self.elevenlabs.is_some(),
            self.playht.is_some(),
            self.openai.is_some(),
        )
    }
}

/// Immutable, fully resolved configuration handed to every constructor.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config: Config,
    pub credentials: Credentials,
    pub characters: CharacterTable,
    pub availability: ProviderAvailability,
}

impl AppConfig {
    pub fn new(config: Config, credentials: Credentials, characters: CharacterTable) -> Self {
        let availability = credentials.availability();
        Self {
            config,
            credentials,
            characters,
            availability,
        }
    }

    /// Resolve credentials and voice overrides from the process environment.
    pub fn from_env(config: Config) -> Self {
        let credentials = Credentials::resolve(&config);
        let characters = config
            .character_table()
            .with_voice_overrides(|key| std::env::var(key).ok());
        Self::new(config, credentials, characters)
    }
}
