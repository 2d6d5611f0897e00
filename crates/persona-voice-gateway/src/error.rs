//! HTTP error responses. Every error body is `{"error": message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use persona_voice_media::{TranscodeError, TranscriptionError};
use persona_voice_providers::{ChatError, SynthesisError};

use crate::analytics::AnalyticsError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Too many requests from this IP, please try again later.")]
    RateLimited,

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs and the `errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::RateLimited => "rate_limited",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::BadGateway(_) => "bad_gateway",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, kind = self.kind(), error = %self, "Request failed");
        }
        #[cfg(feature = "metrics")]
        crate::metrics::record_error(self.kind());
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SynthesisError> for ApiError {
    fn from(e: SynthesisError) -> Self {
        match e {
            SynthesisError::Validation(msg) => Self::BadRequest(msg),
            SynthesisError::ProviderUnavailable(_) | SynthesisError::Exhausted { .. } => {
                Self::ServiceUnavailable(e.to_string())
            }
            SynthesisError::Failed { .. } => Self::BadGateway(e.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::MissingInput => Self::BadRequest(e.to_string()),
            ChatError::NotConfigured => Self::ServiceUnavailable(e.to_string()),
            ChatError::Upstream(_) | ChatError::EmptyResponse => {
                Self::BadGateway("Failed to get response from AI".into())
            }
        }
    }
}

impl From<TranscriptionError> for ApiError {
    fn from(e: TranscriptionError) -> Self {
        match e {
            TranscriptionError::EmptyAudio => Self::BadRequest(e.to_string()),
            TranscriptionError::NotConfigured => Self::ServiceUnavailable(e.to_string()),
            TranscriptionError::Api { .. } | TranscriptionError::Request(_) => {
                tracing::warn!(%e, "Transcription failed");
                Self::BadGateway("Failed to transcribe audio".into())
            }
        }
    }
}

impl From<TranscodeError> for ApiError {
    fn from(e: TranscodeError) -> Self {
        match e {
            TranscodeError::EmptyInput => Self::BadRequest("No audio file provided".into()),
            other => {
                tracing::warn!(%other, "Transcode failed");
                Self::Internal("Audio processing failed".into())
            }
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::NotConfigured => Self::ServiceUnavailable(e.to_string()),
            other => {
                tracing::warn!(%other, "Analytics query failed");
                Self::BadGateway("Failed to fetch analytics".into())
            }
        }
    }
}
