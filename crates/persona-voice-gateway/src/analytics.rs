//! Event log backed by a hosted Postgres REST API (Supabase).
//!
//! Rows go to `/rest/v1/{table}` and files to `/storage/v1/object/{bucket}/{name}`.
//! Writes are fire-and-forget: failures are logged and never reach the caller.

use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use persona_voice_core::config::AnalyticsCredentials;

pub const ANALYTICS_TABLE: &str = "analytics";
pub const CONVERSATIONS_TABLE: &str = "conversations";
pub const VOICE_CLIPS_BUCKET: &str = "voice-clips";
pub const PROCESSED_AUDIO_BUCKET: &str = "processed-audio";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Analytics is not configured")]
    NotConfigured,

    #[error("Analytics API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Analytics request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// One row of the `conversations` table.
#[derive(Debug, Clone)]
pub struct ConversationRecord<'a> {
    pub session_id: &'a str,
    pub character_id: &'a str,
    pub user_message: &'a str,
    pub ai_response: &'a str,
}

#[derive(Clone)]
pub struct EventLog {
    backend: Option<Backend>,
    store_voice_clips: bool,
}

#[derive(Clone)]
struct Backend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl EventLog {
    pub fn new(
        client: reqwest::Client,
        credentials: Option<AnalyticsCredentials>,
        store_voice_clips: bool,
    ) -> Self {
        Self {
            backend: credentials.map(|c| Backend {
                base_url: c.url.trim_end_matches('/').to_string(),
                api_key: c.api_key,
                client,
            }),
            store_voice_clips,
        }
    }

    /// An event log that drops everything.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            store_voice_clips: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn stores_voice_clips(&self) -> bool {
        self.is_enabled() && self.store_voice_clips
    }

    /// Record a usage event in the background.
    pub fn track(&self, event: &str, data: Value) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let user_agent = data
            .get("userAgent")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let row = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
            "user_agent": user_agent,
        });
        let event = event.to_string();
        tokio::spawn(async move {
            if let Err(e) = backend.insert(ANALYTICS_TABLE, &row).await {
                warn!(%event, %e, "Failed to track analytics");
            }
        });
    }

    /// Store a chat exchange in the background.
    pub fn store_conversation(&self, record: ConversationRecord<'_>) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let row = json!({
            "session_id": record.session_id,
            "character_id": record.character_id,
            "user_message": record.user_message,
            "ai_response": record.ai_response,
            "timestamp": Utc::now().to_rfc3339(),
        });
        tokio::spawn(async move {
            if let Err(e) = backend.insert(CONVERSATIONS_TABLE, &row).await {
                warn!(%e, "Failed to store conversation");
            }
        });
    }

    /// Upload an audio file in the background.
    pub fn store_clip(&self, bucket: &'static str, name: String, audio: Bytes) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = backend.upload(bucket, &name, audio).await {
                warn!(bucket, file = %name, %e, "Failed to store audio");
            }
        });
    }

    /// Latest `limit` tracked events, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Value, AnalyticsError> {
        let backend = self.backend.as_ref().ok_or(AnalyticsError::NotConfigured)?;
        backend.select_recent(ANALYTICS_TABLE, limit).await
    }
}

impl Backend {
    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<(), AnalyticsError> {
        let resp = self
            .authed(self.client.post(format!("{}/rest/v1/{table}", self.base_url)))
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await?;
        check(resp).await?;
        debug!(table, "Row inserted");
        Ok(())
    }

    async fn upload(&self, bucket: &str, name: &str, audio: Bytes) -> Result<(), AnalyticsError> {
        let resp = self
            .authed(self.client.post(format!(
                "{}/storage/v1/object/{bucket}/{name}",
                self.base_url
            )))
            .header(reqwest::header::CONTENT_TYPE, "audio/mpeg")
            .body(audio)
            .send()
            .await?;
        check(resp).await?;
        debug!(bucket, file = name, "Audio stored");
        Ok(())
    }

    async fn select_recent(&self, table: &str, limit: usize) -> Result<Value, AnalyticsError> {
        let resp = self
            .authed(self.client.get(format!("{}/rest/v1/{table}", self.base_url)))
            .query(&[
                ("select", "*".to_string()),
                ("order", "timestamp.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, AnalyticsError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(AnalyticsError::Api { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn log_for(server: &MockServer) -> EventLog {
        EventLog::new(
            reqwest::Client::new(),
            Some(AnalyticsCredentials {
                url: format!("{}/", server.uri()),
                api_key: "anon".into(),
            }),
            true,
        )
    }

    async fn wait_for_requests(server: &MockServer, n: usize) {
        for _ in 0..50 {
            if server.received_requests().await.map(|r| r.len()).unwrap_or(0) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_track_inserts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/analytics"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .and(body_partial_json(json!([{
                "event": "chat_message",
                "user_agent": "curl/8"
            }])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        log_for(&server).track(
            "chat_message",
            json!({"characterId": "yoda", "userAgent": "curl/8"}),
        );
        wait_for_requests(&server, 1).await;
    }

    #[tokio::test]
    async fn test_store_clip_uploads_to_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/voice-clips/a.mp3"))
            .and(header("content-type", "audio/mpeg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let log = log_for(&server);
        assert!(log.stores_voice_clips());
        log.store_clip(VOICE_CLIPS_BUCKET, "a.mp3".into(), Bytes::from_static(b"mp3"));
        wait_for_requests(&server, 1).await;
    }

    #[tokio::test]
    async fn test_recent_orders_and_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/analytics"))
            .and(query_param("order", "timestamp.desc"))
            .and(query_param("limit", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"event": "voice_input"}])),
            )
            .mount(&server)
            .await;

        let rows = log_for(&server).recent(100).await.unwrap();
        assert_eq!(rows[0]["event"], "voice_input");
    }

    #[tokio::test]
    async fn test_recent_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = log_for(&server).recent(10).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_disabled_log_is_noop() {
        let log = EventLog::disabled();
        assert!(!log.is_enabled());
        assert!(!log.stores_voice_clips());
        log.track("chat_message", json!({}));
        log.store_conversation(ConversationRecord {
            session_id: "s",
            character_id: "c",
            user_message: "u",
            ai_response: "a",
        });
        assert!(matches!(
            log.recent(10).await.unwrap_err(),
            AnalyticsError::NotConfigured
        ));
    }
}
