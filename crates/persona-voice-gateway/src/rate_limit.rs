//! Per-IP fixed-window request rate limiter for `/api/*`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::GatewayState;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Simple in-memory per-IP rate limiter.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    /// Create a new rate limiter and spawn its cleanup task.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let limiter = Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        };

        let windows = Arc::downgrade(&limiter.windows);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(window.min(Duration::from_secs(60))).await;
                let Some(windows) = windows.upgrade() else {
                    break;
                };
                let mut map = windows.lock().unwrap_or_else(PoisonError::into_inner);
                map.retain(|_, w| w.started.elapsed() < window);
                debug!(entries = map.len(), "Rate limiter cleanup");
            }
        });

        limiter
    }

    /// Count a request from `ip`. Returns true if allowed, false if rate limited.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut map = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            warn!(%ip, count = entry.count, limit = self.max_requests,
                "Rate limited: too many requests from IP");
            return false;
        }

        entry.count += 1;
        true
    }
}

/// Axum middleware applying the gateway's limiter, when one is configured.
pub async fn limit_requests(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        if !limiter.check(ip) {
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_rate_limiter_allows() {
        let limiter = RateLimiter::new(3, MINUTE);
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks() {
        let limiter = RateLimiter::new(2, MINUTE);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[tokio::test]
    async fn test_rate_limiter_different_ips() {
        let limiter = RateLimiter::new(1, MINUTE);
        let ip1 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let ip2 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check(ip1));
        assert!(limiter.check(ip2));
        assert!(!limiter.check(ip1));
        assert!(!limiter.check(ip2));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(1, MINUTE);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let t0 = Instant::now();

        assert!(limiter.check_at(ip, t0));
        assert!(!limiter.check_at(ip, t0 + Duration::from_secs(59)));
        assert!(limiter.check_at(ip, t0 + MINUTE));
    }
}
