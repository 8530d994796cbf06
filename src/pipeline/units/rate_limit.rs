//! Per-client token bucket that short-circuits the pipeline.
//!
//! # Design Decisions
//! - Keyed by client IP; requests without a peer address share one bucket
//! - Buckets live in a `DashMap` so concurrent requests only contend per key
//! - A bucket that has refilled to capacity is indistinguishable from a new one,
//!   so such buckets are swept once the map grows past a threshold
//! - State belongs to the pipeline snapshot and starts fresh on reload

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

/// Tracked clients before the first sweep of refilled buckets.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            refreshed: now,
        }
    }

    /// Tokens available at `now`, capped at `burst`.
    fn level(&self, now: Instant, rate: f64, burst: f64) -> f64 {
        let idle = now.saturating_duration_since(self.refreshed).as_secs_f64();
        (self.tokens + idle * rate).min(burst)
    }

    fn take(&mut self, now: Instant, rate: f64, burst: f64) -> bool {
        self.tokens = self.level(now, rate, burst);
        self.refreshed = now;
        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    rps: f64,
    burst: f64,
    buckets: DashMap<IpAddr, Bucket>,
    sweep_threshold: usize,
    next_sweep: AtomicUsize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_sweep_threshold(config, SWEEP_THRESHOLD)
    }

    fn with_sweep_threshold(config: &RateLimitConfig, threshold: usize) -> Self {
        Self {
            enabled: config.enabled,
            rps: f64::from(config.requests_per_second),
            burst: f64::from(config.burst_size),
            buckets: DashMap::new(),
            sweep_threshold: threshold,
            next_sweep: AtomicUsize::new(threshold),
        }
    }

    /// Take one token for `client`.
    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let allowed = self
            .buckets
            .entry(client)
            .or_insert_with(|| Bucket::full(self.burst, now))
            .take(now, self.rps, self.burst);

        // The entry guard is released above; retain locks every shard
        if self.buckets.len() > self.next_sweep.load(Ordering::Relaxed) {
            self.sweep(now);
        }
        allowed
    }

    /// Drop buckets that have refilled to capacity.
    fn sweep(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.level(now, self.rps, self.burst) < self.burst);
        let after = self.buckets.len();
        // Scale with the live set so a busy period does not sweep on every request
        self.next_sweep
            .store(self.sweep_threshold.max(after * 2), Ordering::Relaxed);
        tracing::debug!(before, after, "Swept idle rate-limit buckets");
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

#[async_trait]
impl Unit for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn order(&self) -> i32 {
        5
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn on_request(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let client = ctx
            .inbound()
            .client_addr
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        if !self.check(client) {
            tracing::warn!(request_id = %ctx.request_id, client = %client, "Rate limit exceeded");
            ctx.skip_upstream = true;
            ctx.skip_response_processing = true;
            ctx.respond_error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::pipeline::context::test_context;

    fn limiter(rps: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst_size: burst,
        })
    }

    #[test]
    fn test_burst_then_reject_per_client() {
        let limiter = limiter(1, 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_short_circuits() {
        let limiter = limiter(1, 1);
        let mut first = test_context(RouteConfig::new("r", "/", "http://up"), "/x");
        limiter.on_request(&mut first).await.unwrap();
        assert!(!first.skip_upstream);

        let mut second = test_context(RouteConfig::new("r", "/", "http://up"), "/x");
        limiter.on_request(&mut second).await.unwrap();
        assert!(second.skip_upstream);
        assert_eq!(second.final_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_refilled_buckets_are_swept() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_second: 10,
            burst_size: 2,
        };
        let limiter = RateLimiter::with_sweep_threshold(&config, 3);
        let start = Instant::now();

        for i in 1..=3u8 {
            assert!(limiter.check_at(IpAddr::from([10, 0, 0, i]), start));
        }
        assert_eq!(limiter.tracked_clients(), 3);

        // One second later every bucket is back at capacity
        let later = start + std::time::Duration::from_secs(1);
        let busy: IpAddr = "10.0.1.1".parse().unwrap();
        assert!(limiter.check_at(busy, later));
        assert!(limiter.check_at(busy, later));
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(!limiter.check_at(busy, later), "a swept map keeps live buckets");
    }

    #[test]
    fn test_draining_buckets_survive_a_sweep() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst_size: 5,
        };
        let limiter = RateLimiter::with_sweep_threshold(&config, 2);
        let now = Instant::now();

        for i in 1..=3u8 {
            limiter.check_at(IpAddr::from([10, 0, 0, i]), now);
        }
        assert_eq!(limiter.tracked_clients(), 3);
    }

    #[test]
    fn test_disabled_by_config() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        assert!(!limiter.is_enabled());
    }
}
