//! Per-client rate limiting.
//!
//! Token buckets keyed by client IP, created lazily on first request and
//! kept in a `DashMap` so lookups on different clients never contend.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::http::middleware::queue;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared state of the rate limiting middleware.
#[derive(Debug)]
pub struct RateLimiterState {
    buckets: DashMap<IpAddr, TokenBucket>,
    rps: f64,
    burst: f64,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: config.requests_per_second as f64,
            burst: config.burst_size.max(1) as f64,
        }
    }

    /// Take one token for `client`.
    pub fn check(&self, client: IpAddr) -> bool {
        self.buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.rps)
    }

    /// Number of clients seen so far.
    pub fn clients(&self) -> usize {
        self.buckets.len()
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = addr.ip();
    if state.check(client) {
        return next.run(request).await;
    }

    tracing::warn!(client = %client, "rate limit exceeded");
    metrics::record_rate_limited("client_ip");
    queue(ApiError::bare(StatusCode::TOO_MANY_REQUESTS))
}
