//! Prometheus metrics recording and endpoint.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use persona_voice_core::voice::VoiceProvider;

static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Install the process-wide Prometheus recorder on first use and return its
/// handle. Later calls reuse the installed recorder.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let mut slot = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    *slot = Some(handle.clone());
    Ok(handle)
}

/// Record an HTTP request with its route, status and duration.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    let labels = [("route", route.to_string()), ("status", status.to_string())];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
}

/// Axum middleware recording every request by matched route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".into());
    let started = Instant::now();
    let response = next.run(req).await;
    record_request(&route, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// Record one provider call and whether it produced audio.
pub fn record_synthesis(provider: VoiceProvider, success: bool, duration_secs: f64) {
    let labels = [
        ("provider", provider.as_str().to_string()),
        ("outcome", if success { "success" } else { "failure" }.to_string()),
    ];
    metrics::counter!("voice_synthesis_total", &labels).increment(1);
    metrics::histogram!("voice_synthesis_duration_seconds", &labels).record(duration_secs);
}

/// Record a completed fallback chain and how many providers it skipped.
pub fn record_fallback(provider: Option<VoiceProvider>, hops: usize) {
    let provider = provider.map_or("none", |p| p.as_str());
    let labels = [("provider", provider.to_string())];
    metrics::counter!("voice_fallback_chains_total", &labels).increment(1);
    metrics::histogram!("voice_fallback_hops").record(hops as f64);
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}
