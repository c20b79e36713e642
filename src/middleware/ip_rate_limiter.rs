//! Per-IP sliding window limiter for the login endpoint.
//!
//! In-memory (dashmap); the back office runs as a single instance.

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    /// 10 login attempts per minute per address.
    pub fn login() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

struct IpTracker {
    requests: Vec<Instant>,
    last_seen: Instant,
}

impl IpTracker {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    fn check_limit(&mut self, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        self.requests
            .retain(|&req_time| now.duration_since(req_time) < config.window);
        self.last_seen = now;

        if self.requests.len() >= config.max_requests as usize {
            return false;
        }
        self.requests.push(now);
        true
    }

    fn retry_after(&self, config: &RateLimitConfig) -> u64 {
        self.requests
            .first()
            .map(|&oldest| {
                config
                    .window
                    .saturating_sub(Instant::now().duration_since(oldest))
                    .as_secs()
                    .max(1)
            })
            .unwrap_or(0)
    }
}

pub struct RateLimiter {
    trackers: Arc<DashMap<String, IpTracker>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            trackers: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Periodically drops addresses that have been quiet for two windows.
    pub fn spawn_cleanup(self: &Arc<Self>) {
        let trackers = self.trackers.clone();
        let window = self.config.window;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                trackers.retain(|_, tracker| tracker.last_seen.elapsed() < window * 2);
            }
        });
    }

    /// `Err(retry_after_secs)` once the address is over the limit.
    pub fn check(&self, ip: &str) -> Result<(), u64> {
        let mut entry = self
            .trackers
            .entry(ip.to_string())
            .or_insert_with(IpTracker::new);

        if entry.check_limit(&self.config) {
            Ok(())
        } else {
            Err(entry.retry_after(&self.config))
        }
    }
}

/// Peer address when the server was started with connect info, otherwise the
/// first `X-Forwarded-For` hop (reverse proxy, test client).
fn client_ip(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let Some(limiter) = request.extensions().get::<Arc<RateLimiter>>().cloned() else {
        tracing::error!("RateLimiter missing from request extensions");
        return next.run(request).await;
    };

    let ip = client_ip(&request);
    match limiter.check(&ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!("Rate limit exceeded for IP: {}", ip);
            crate::middleware::metrics::record_auth_failure("rate_limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                axum::Json(json!({
                    "error": format!("Too many attempts. Try again in {} seconds.", retry_after),
                    "status": 429
                })),
            )
                .into_response()
        }
    }
}
