//! Rate Limiter (C2, limiting half).
//!
//! Per-venue token bucket with burst allowance plus hourly/daily/monthly
//! hard caps. Grounded on `middleware/rate_limit.rs`'s sliding-window
//! limiter shape (config struct, per-key entry, enum result), generalized
//! from per-IP HTTP throttling to per-venue outbound call throttling.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst_allowance: u32,
    pub hourly_cap: Option<u64>,
    pub daily_cap: Option<u64>,
    pub monthly_cap: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_allowance: 20,
            hourly_cap: None,
            daily_cap: None,
            monthly_cap: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("RATE_LIMIT_EXCEEDED: token bucket empty")]
    BucketEmpty,
    #[error("RATE_LIMIT_EXCEEDED: hourly cap exhausted")]
    HourlyCapExhausted,
    #[error("RATE_LIMIT_EXCEEDED: daily cap exhausted")]
    DailyCapExhausted,
    #[error("RATE_LIMIT_EXCEEDED: monthly cap exhausted")]
    MonthlyCapExhausted,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    hourly_used: u64,
    hourly_window_start: Instant,
    daily_used: u64,
    daily_window_start: Instant,
    monthly_used: u64,
    monthly_window_start: Instant,
}

/// FIFO wall-clock token bucket; refills continuously so no caller on the
/// same venue can starve another (spec.md §5 Fairness).
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(BucketState {
                tokens: config.burst_allowance as f64,
                last_refill: now,
                hourly_used: 0,
                hourly_window_start: now,
                daily_used: 0,
                daily_window_start: now,
                monthly_used: 0,
                monthly_window_start: now,
            }),
            config,
        }
    }

    /// Attempt to acquire a single token; fails fast rather than blocking,
    /// per spec.md §4.2's `RATE_LIMIT_EXCEEDED` contract. Callers that want
    /// to wait should retry after backing off.
    pub fn try_acquire(&self) -> Result<(), RateLimitError> {
        let mut s = self.state.lock();
        let now = Instant::now();

        if now.duration_since(s.hourly_window_start) >= Duration::from_secs(3600) {
            s.hourly_used = 0;
            s.hourly_window_start = now;
        }
        if now.duration_since(s.daily_window_start) >= Duration::from_secs(86_400) {
            s.daily_used = 0;
            s.daily_window_start = now;
        }
        if now.duration_since(s.monthly_window_start) >= Duration::from_secs(30 * 86_400) {
            s.monthly_used = 0;
            s.monthly_window_start = now;
        }

        if let Some(cap) = self.config.monthly_cap {
            if s.monthly_used >= cap {
                return Err(RateLimitError::MonthlyCapExhausted);
            }
        }
        if let Some(cap) = self.config.daily_cap {
            if s.daily_used >= cap {
                return Err(RateLimitError::DailyCapExhausted);
            }
        }
        if let Some(cap) = self.config.hourly_cap {
            if s.hourly_used >= cap {
                return Err(RateLimitError::HourlyCapExhausted);
            }
        }

        let elapsed = now.duration_since(s.last_refill).as_secs_f64();
        s.tokens = (s.tokens + elapsed * self.config.requests_per_second)
            .min(self.config.burst_allowance as f64);
        s.last_refill = now;

        if s.tokens < 1.0 {
            return Err(RateLimitError::BucketEmpty);
        }
        s.tokens -= 1.0;
        s.hourly_used += 1;
        s.daily_used += 1;
        s.monthly_used += 1;
        Ok(())
    }
}
