//! Circuit Breaker (C2, breaker half).
//!
//! Per-operation state machine: closed -> open (error-rate or consecutive
//! failures or quota exhaustion) -> half-open (probe) -> closed/open.
//! Grounded on `scrapers/binance_session.rs`'s endpoint circuit-breaker
//! fields (`circuit_breaker_threshold`, `circuit_breaker_cooldown_secs`)
//! and transition-reason logging style, generalized from WS endpoint
//! rotation to the facade's per-venue/per-endpoint breaker.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    pub max_requests: u32,
    pub error_rate_threshold: f64,
    pub min_sample_size: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            max_requests: 3,
            error_rate_threshold: 0.5,
            min_sample_size: 10,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_inflight: u32,
    opened_at: Option<Instant>,
    // ring of recent outcomes for the error-rate trip condition
    recent_outcomes: VecDeque<bool>,
}

/// A named outcome event, emitted for the observer requirement in
/// spec.md §4.2 ("state transitions are observable side effects").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    Opened,
    HalfOpened,
    Closed,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                half_open_inflight: 0,
                opened_at: None,
                recent_outcomes: VecDeque::with_capacity(64),
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Call before attempting the operation. Returns `Ok(())` if the call
    /// may proceed (closed, or an admitted half-open probe); `Err` means
    /// fail fast with `PROVIDER_DEGRADED`.
    pub fn before_call(&self) -> Result<(), ()> {
        let mut s = self.inner.lock();
        match s.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = s.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.timeout {
                    s.state = BreakerState::HalfOpen;
                    s.half_open_successes = 0;
                    s.half_open_inflight = 0;
                    info!(breaker = %self.name, event = ?BreakerEvent::HalfOpened, "breaker half-open");
                    self.admit_half_open(&mut s)
                } else {
                    Err(())
                }
            }
            BreakerState::HalfOpen => self.admit_half_open(&mut s),
        }
    }

    fn admit_half_open(&self, s: &mut Inner) -> Result<(), ()> {
        if s.half_open_inflight >= self.config.max_requests {
            return Err(());
        }
        s.half_open_inflight += 1;
        Ok(())
    }

    /// Cancellation by caller timeout is not counted as a failure
    /// (spec.md §4.2).
    pub fn record_canceled(&self) {
        let mut s = self.inner.lock();
        if s.state == BreakerState::HalfOpen {
            s.half_open_inflight = s.half_open_inflight.saturating_sub(1);
        }
    }

    pub fn record_success(&self) {
        let mut s = self.inner.lock();
        push_outcome(&mut s.recent_outcomes, true);
        match s.state {
            BreakerState::Closed => {
                s.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                s.half_open_inflight = s.half_open_inflight.saturating_sub(1);
                s.half_open_successes += 1;
                if s.half_open_successes >= self.config.success_threshold {
                    s.state = BreakerState::Closed;
                    s.consecutive_failures = 0;
                    info!(breaker = %self.name, event = ?BreakerEvent::Closed, "breaker closed");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut s = self.inner.lock();
        push_outcome(&mut s.recent_outcomes, false);
        match s.state {
            BreakerState::Closed => {
                s.consecutive_failures += 1;
                let error_rate = error_rate(&s.recent_outcomes);
                let rate_tripped =
                    s.recent_outcomes.len() >= self.config.min_sample_size && error_rate >= self.config.error_rate_threshold;
                if s.consecutive_failures >= self.config.failure_threshold || rate_tripped {
                    self.trip(&mut s);
                }
            }
            BreakerState::HalfOpen => {
                // any failure during half-open re-opens immediately
                s.half_open_inflight = s.half_open_inflight.saturating_sub(1);
                self.trip(&mut s);
            }
            BreakerState::Open => {}
        }
    }

    /// Monthly quota exhaustion also trips the breaker (spec.md §4.2).
    pub fn record_quota_exhausted(&self) {
        let mut s = self.inner.lock();
        self.trip(&mut s);
    }

    fn trip(&self, s: &mut Inner) {
        s.state = BreakerState::Open;
        s.opened_at = Some(Instant::now());
        warn!(breaker = %self.name, event = ?BreakerEvent::Opened, "breaker opened");
    }
}

fn push_outcome(outcomes: &mut VecDeque<bool>, success: bool) {
    if outcomes.len() >= 64 {
        outcomes.pop_front();
    }
    outcomes.push_back(success);
}

fn error_rate(outcomes: &VecDeque<bool>) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let failures = outcomes.iter().filter(|s| !**s).count();
    failures as f64 / outcomes.len() as f64
}

/// Ordered fallback chain: first venue whose breaker is not Open handles
/// the call (spec.md §4.2, §9 Open Question 4 — explicitly not
/// load-balanced).
pub fn select_fallback<'a>(
    chain: &'a [(&'a str, &'a CircuitBreaker)],
) -> Option<&'a str> {
    chain
        .iter()
        .find(|(_, breaker)| breaker.state() != BreakerState::Open)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s7_breaker_trips_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(
            "venue_a",
            BreakerConfig { failure_threshold: 3, ..Default::default() },
        );
        for _ in 0..3 {
            breaker.before_call().unwrap();
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_fails_fast_until_timeout() {
        let breaker = CircuitBreaker::new(
            "venue_a",
            BreakerConfig { failure_threshold: 1, timeout: Duration::from_millis(10), ..Default::default() },
        );
        breaker.before_call().unwrap();
        breaker.record_failure();
        assert!(breaker.before_call().is_err());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.before_call().is_ok()); // transitions to half-open, admits probe
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_admits_at_most_max_requests() {
        let breaker = CircuitBreaker::new(
            "venue_a",
            BreakerConfig { failure_threshold: 1, timeout: Duration::from_millis(1), max_requests: 2, ..Default::default() },
        );
        breaker.before_call().unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.before_call().is_ok());
        assert!(breaker.before_call().is_ok());
        assert!(breaker.before_call().is_err());
    }

    #[test]
    fn half_open_success_threshold_closes_breaker() {
        let breaker = CircuitBreaker::new(
            "venue_a",
            BreakerConfig { failure_threshold: 1, timeout: Duration::from_millis(1), success_threshold: 2, max_requests: 5, ..Default::default() },
        );
        breaker.before_call().unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        breaker.before_call().unwrap();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.before_call().unwrap();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn canceled_call_not_counted_as_failure() {
        let breaker = CircuitBreaker::new("venue_a", BreakerConfig { failure_threshold: 1, ..Default::default() });
        breaker.before_call().unwrap();
        breaker.record_canceled();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn fallback_picks_first_non_open() {
        let a = CircuitBreaker::new("a", BreakerConfig { failure_threshold: 1, ..Default::default() });
        let b = CircuitBreaker::new("b", BreakerConfig::default());
        a.before_call().unwrap();
        a.record_failure();
        assert_eq!(a.state(), BreakerState::Open);
        let chain = [("a", &a), ("b", &b)];
        assert_eq!(select_fallback(&chain), Some("b"));
    }
}
