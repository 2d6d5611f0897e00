//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::rate_limit::limit_requests;
use crate::state::GatewayState;

/// Build the full router: `/api` routes, middleware and the optional static client.
pub fn build_router(state: Arc<GatewayState>) -> anyhow::Result<Router> {
    let server = state.app.config.server();

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/characters", get(handlers::characters))
        .route("/chat", post(handlers::chat))
        .route("/speech-to-text", post(handlers::speech_to_text))
        .route("/text-to-speech", post(handlers::speak_with_fallback))
        .route("/text-to-speech/{provider}", post(handlers::speak_with_provider))
        .route("/audio/process", post(handlers::process_audio))
        .route("/analytics", get(handlers::analytics))
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests))
        .with_state(state.clone());

    let mut app = Router::new().nest("/api", api);

    if let Some(dir) = &server.static_dir {
        let index = Path::new(dir).join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
        info!(dir = %dir, "Serving static client");
    }

    #[cfg(feature = "metrics")]
    {
        app = app.route_layer(middleware::from_fn(crate::metrics::track_requests));
    }

    let origin = state.app.config.cors_origin();
    let origin = HeaderValue::from_str(&origin)
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{origin}': {e}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([handlers::VOICE_PROVIDER_HEADER])
        .allow_credentials(true);

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ));

    Ok(app
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(security_headers)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Start the gateway HTTP server and run until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, bind: &str, port: u16) -> anyhow::Result<()> {
    #[allow(unused_mut)]
    let mut app = build_router(state.clone())?;

    #[cfg(feature = "metrics")]
    {
        let handle = crate::metrics::install_prometheus_recorder()?;
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
        info!("Prometheus metrics at /metrics");
    }

    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{bind}:{port}': {e}"))?;

    if let Some(tls) = state.app.config.server().tls {
        #[cfg(feature = "tls")]
        {
            return serve_tls(app, addr, &tls).await;
        }
        #[cfg(not(feature = "tls"))]
        {
            warn!(
                cert = %tls.cert_path,
                "TLS configured but this build lacks the `tls` feature; serving plain HTTP"
            );
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

#[cfg(feature = "tls")]
async fn serve_tls(
    app: Router,
    addr: SocketAddr,
    tls: &persona_voice_core::config::TlsConfig,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to load TLS certificates from {} and {}: {e}",
                tls.cert_path,
                tls.key_path
            )
        })?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    info!("Gateway listening on https://{addr}");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use persona_voice_core::config::{AppConfig, Config, Credentials};
    use persona_voice_core::character::CharacterTable;
    use tower::ServiceExt;

    fn router(config: Config, characters: CharacterTable) -> Router {
        let app = AppConfig::new(config, Credentials::default(), characters);
        build_router(Arc::new(GatewayState::new(app))).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_shape() {
        let app = router(Config::default(), CharacterTable::builtin());
        let resp = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
        assert_eq!(resp.headers()["x-frame-options"], "DENY");

        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["voice_providers"]["elevenlabs"], false);
        assert_eq!(json["voice_providers"]["playht"], false);
        assert_eq!(json["voice_providers"]["openai"], false);
        assert_eq!(json["analytics"], false);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_empty_character_table_is_empty_object() {
        let app = router(Config::default(), CharacterTable::empty());
        let resp = app
            .oneshot(Request::get("/api/characters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_bad_request() {
        let app = router(Config::default(), CharacterTable::builtin());
        let resp = app
            .oneshot(
                Request::post("/api/text-to-speech/azure")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"hi","characterId":"yoda"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_body() {
        let app = router(Config::default(), CharacterTable::builtin());
        let resp = app
            .oneshot(
                Request::post("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_rate_limit_answers_429() {
        let config = Config::parse(r#"{ server: { rate_limit: { max_requests: 2 } } }"#).unwrap();
        let app = router(config, CharacterTable::builtin());

        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_analytics_unconfigured_is_503() {
        let app = router(Config::default(), CharacterTable::builtin());
        let resp = app
            .oneshot(Request::get("/api/analytics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let config =
            Config::parse(r#"{ server: { cors_origin: "http://localhost:3000" } }"#).unwrap();
        let app = router(config, CharacterTable::builtin());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/chat")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
    }
}
