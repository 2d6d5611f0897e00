//! Route handlers for the `/api` surface.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        Path, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use persona_voice_core::voice::VoiceProvider;
use persona_voice_providers::fallback::synthesize_with_fallback;
use persona_voice_providers::{AudioClip, SynthesisError, SynthesisRequest};

use crate::analytics::{ConversationRecord, PROCESSED_AUDIO_BUCKET, VOICE_CLIPS_BUCKET};
use crate::error::ApiError;
use crate::state::GatewayState;

type ApiResult<T> = Result<T, ApiError>;

/// Header naming the provider that produced fallback audio.
pub const VOICE_PROVIDER_HEADER: HeaderName = HeaderName::from_static("x-voice-provider");

const RECENT_EVENTS: usize = 100;

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(b)| b)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

// --- Health & characters ---

pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "voice_providers": state.voices.availability(),
        "analytics": state.events.is_enabled(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

pub async fn characters(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.voices.characters().clone())
}

// --- Chat ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(body)?;
    if body.message.trim().is_empty() || body.character_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Message and character ID are required".into(),
        ));
    }
    let character = state
        .voices
        .characters()
        .get(&body.character_id)
        .ok_or_else(|| ApiError::BadRequest("Character not found".into()))?;

    let session_id = body
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    state.events.track(
        "chat_message",
        json!({
            "characterId": body.character_id,
            "sessionId": session_id,
            "messageLength": body.message.len(),
            "userAgent": user_agent(&headers),
        }),
    );

    let response = state.chat.reply(character, &body.message).await?;

    state.events.store_conversation(ConversationRecord {
        session_id: &session_id,
        character_id: &body.character_id,
        user_message: &body.message,
        ai_response: &response,
    });

    Ok(Json(json!({
        "response": response,
        "character": character,
        "timestamp": Utc::now().to_rfc3339(),
        "sessionId": session_id,
    })))
}

// --- Audio uploads ---

struct Upload {
    bytes: Bytes,
    file_name: String,
    content_type: String,
}

/// Pull the `audio` part out of a multipart form.
async fn audio_upload(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Upload> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("audio.webm").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            break;
        }
        return Ok(Upload {
            bytes,
            file_name,
            content_type,
        });
    }
    Err(ApiError::BadRequest("No audio file provided".into()))
}

pub async fn speech_to_text(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let upload = audio_upload(multipart).await?;

    state.events.track(
        "voice_input",
        json!({
            "fileSize": upload.bytes.len(),
            "userAgent": user_agent(&headers),
        }),
    );

    let text = state
        .transcriber
        .transcribe(upload.bytes, &upload.file_name, &upload.content_type)
        .await?;
    debug!(chars = text.len(), "Transcribed audio");
    Ok(Json(json!({ "text": text })))
}

pub async fn process_audio(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let upload = audio_upload(multipart).await?;
    let mp3 = state.transcoder.to_mp3(upload.bytes).await?;

    let file_name = format!("{}.mp3", Uuid::new_v4());
    info!(file = %file_name, bytes = mp3.len(), "Audio processed");
    state
        .events
        .store_clip(PROCESSED_AUDIO_BUCKET, file_name.clone(), mp3);

    Ok(Json(json!({ "success": true, "fileName": file_name })))
}

// --- Speech synthesis ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default)]
    pub provider: Option<String>,
}

fn parse_provider(raw: &str) -> ApiResult<VoiceProvider> {
    raw.parse::<VoiceProvider>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn audio_response(clip: AudioClip) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(clip.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(clip.len())),
        ],
        clip.bytes,
    )
        .into_response()
}

/// Remember the provider and keep a copy of the clip when storage is enabled.
async fn after_synthesis(state: &GatewayState, clip: &AudioClip) {
    state.remember_voice(clip.provider).await;
    if state.events.stores_voice_clips() {
        state.events.store_clip(
            VOICE_CLIPS_BUCKET,
            format!("{}.mp3", Uuid::new_v4()),
            clip.bytes.clone(),
        );
    }
}

/// Synthesize through exactly the provider named in the path.
pub async fn speak_with_provider(
    State(state): State<Arc<GatewayState>>,
    Path(provider): Path<String>,
    body: Result<Json<SpeakBody>, JsonRejection>,
) -> ApiResult<Response> {
    let provider = parse_provider(&provider)?;
    let body = json_body(body)?;
    let request = SynthesisRequest {
        text: body.text,
        character_id: body.character_id,
        provider,
    };

    let started = Instant::now();
    let result = state.voices.synthesize(&request).await;
    #[cfg(feature = "metrics")]
    if !matches!(result, Err(SynthesisError::Validation(_))) {
        crate::metrics::record_synthesis(provider, result.is_ok(), started.elapsed().as_secs_f64());
    }
    let clip = result?;

    debug!(%provider, elapsed_ms = started.elapsed().as_millis() as u64, "Single-provider synthesis");
    after_synthesis(&state, &clip).await;
    Ok(audio_response(clip))
}

/// Synthesize with provider fallback; the response names the provider used.
pub async fn speak_with_fallback(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<SpeakBody>, JsonRejection>,
) -> ApiResult<Response> {
    let body = json_body(body)?;
    let requested = body.provider.as_deref().map(parse_provider).transpose()?;
    let last = state.last_voice().await;

    let result =
        synthesize_with_fallback(&state.voices, &body.text, &body.character_id, requested, last)
            .await;

    #[cfg(feature = "metrics")]
    match &result {
        Ok(outcome) => crate::metrics::record_fallback(Some(outcome.clip.provider), outcome.hops()),
        Err(SynthesisError::Exhausted { attempts }) => {
            crate::metrics::record_fallback(None, attempts.len())
        }
        Err(_) => {}
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e @ SynthesisError::Exhausted { .. }) => {
            tracing::warn!(%e, "Voice fallback exhausted");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if outcome.hops() > 0 {
        info!(
            provider = %outcome.clip.provider,
            skipped = outcome.hops(),
            "Served audio from fallback provider"
        );
    }
    after_synthesis(&state, &outcome.clip).await;

    let provider = outcome.clip.provider;
    let mut response = audio_response(outcome.clip);
    response.headers_mut().insert(
        VOICE_PROVIDER_HEADER,
        HeaderValue::from_static(provider.as_str()),
    );
    Ok(response)
}

// --- Analytics ---

pub async fn analytics(State(state): State<Arc<GatewayState>>) -> ApiResult<Json<Value>> {
    Ok(Json(state.events.recent(RECENT_EVENTS).await?))
}
