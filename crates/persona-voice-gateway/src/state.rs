//! Gateway shared state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use persona_voice_core::config::AppConfig;
use persona_voice_core::voice::VoiceProvider;
use persona_voice_media::{Transcoder, Transcriber};
use persona_voice_providers::{ChatClient, VoiceDispatcher};

use crate::analytics::EventLog;
use crate::rate_limit::RateLimiter;

/// Shared gateway state accessible from all handlers.
pub struct GatewayState {
    pub app: Arc<AppConfig>,
    pub voices: Arc<VoiceDispatcher>,
    pub chat: ChatClient,
    pub transcriber: Transcriber,
    pub transcoder: Transcoder,
    pub events: EventLog,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Provider that most recently produced audio; where fallback chains start.
    last_voice: RwLock<Option<VoiceProvider>>,
    pub started_at: Instant,
}

impl GatewayState {
    /// Build every client from the resolved configuration.
    pub fn new(app: AppConfig) -> Self {
        let client = reqwest::Client::new();
        let voices = VoiceDispatcher::from_config(&app, client.clone());
        Self::with_dispatcher(app, voices, client)
    }

    /// Build state around an existing dispatcher.
    pub fn with_dispatcher(app: AppConfig, voices: VoiceDispatcher, client: reqwest::Client) -> Self {
        let config = &app.config;
        let openai = &config.providers.openai;

        let rate_limit = config.rate_limit();
        let rate_limiter = rate_limit.enabled.then(|| {
            Arc::new(RateLimiter::new(
                rate_limit.max_requests,
                Duration::from_secs(rate_limit.window_secs),
            ))
        });

        let analytics = config.analytics();
        let events = EventLog::new(
            client.clone(),
            app.credentials.analytics.clone(),
            analytics.store_voice_clips,
        );

        Self {
            chat: ChatClient::new(client.clone(), app.credentials.openai.clone(), openai),
            transcriber: Transcriber::new(client, app.credentials.openai.clone(), openai),
            transcoder: Transcoder::new(&config.media()),
            events,
            rate_limiter,
            voices: Arc::new(voices),
            last_voice: RwLock::new(None),
            started_at: Instant::now(),
            app: Arc::new(app),
        }
    }

    pub async fn last_voice(&self) -> Option<VoiceProvider> {
        *self.last_voice.read().await
    }

    pub async fn remember_voice(&self, provider: VoiceProvider) {
        *self.last_voice.write().await = Some(provider);
    }
}
