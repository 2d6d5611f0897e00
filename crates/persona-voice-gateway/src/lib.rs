//! HTTP gateway for the character voice chat service.
//!
//! Serves the character table, in-character chat, speech-to-text, voice
//! synthesis (single provider or with fallback), audio processing and the
//! analytics feed under `/api`, plus an optional static browser client.

pub mod analytics;
pub mod error;
pub mod handlers;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod state;

pub use server::{build_router, start_gateway};
pub use state::GatewayState;
