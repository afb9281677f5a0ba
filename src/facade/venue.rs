//! Venue Adapter (C1).
//!
//! A `VenueAdapter` is the thin per-exchange translation layer the facade
//! drives: one implementation per venue, each producing the same domain
//! types (`Bar`, `OrderBookSnapshot`, `FundingRate`, `OpenInterest`)
//! regardless of wire format. Streaming adapters are grounded on
//! `scrapers/binance_price_feed.rs`'s `barter-data` `Streams`/`OrderBooksL1`
//! usage; reconnect/backoff is grounded on `scrapers/binance_session.rs`'s
//! `BackoffCalculator` (xorshift jitter) and `SessionState` transitions,
//! generalized from a single hardcoded venue to any adapter.

use crate::domain::{Bar, FundingRate, Interval, OpenInterest, OrderBookSnapshot, ProviderKind, Symbol, Trade};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("AGGREGATOR_BAN: microstructure path requires venue-native L1/L2")]
    AggregatorBan,
    #[error("venue transport error: {0}")]
    Transport(String),
    #[error("venue returned malformed payload: {0}")]
    MalformedPayload(String),
}

/// Per-venue data access. One instance per (venue) pair, shared across
/// symbols. Implementors never rate-limit or circuit-break themselves —
/// that discipline lives in the facade layer above this trait.
///
/// WARM pull primitives (`fetch_*`) and HOT streaming primitives
/// (`stream_*`) are both required (spec.md §2, §4.1: "StreamTrades/
/// Klines/OrderBook/Funding(symbol) -> channel of events;
/// FetchTrades/Klines/OrderBook/FundingRate/OpenInterest(symbol, ...) ->
/// result").
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this venue can serve the native-book microstructure path
    /// (spec.md §4.7's Quality factor requires `ProviderKind::VenueNative`).
    fn provider_kind(&self) -> ProviderKind;

    async fn fetch_trades(&self, symbol: &Symbol, limit: u32) -> Result<Vec<Trade>, VenueError>;

    async fn fetch_klines(&self, symbol: &Symbol, interval: Interval, limit: u32) -> Result<Vec<Bar>, VenueError>;

    async fn fetch_order_book(&self, symbol: &Symbol, depth: u32) -> Result<OrderBookSnapshot, VenueError>;

    async fn fetch_funding(&self, symbol: &Symbol) -> Result<FundingRate, VenueError>;

    async fn fetch_open_interest(&self, symbol: &Symbol) -> Result<OpenInterest, VenueError>;

    /// Opens (or joins) the venue's trade stream for `symbol`, returning a
    /// broadcast receiver. Implementations own the single upstream
    /// WebSocket reader task and fan it out to every subscriber.
    async fn stream_trades(&self, symbol: &Symbol) -> Result<broadcast::Receiver<Trade>, VenueError>;

    async fn stream_klines(&self, symbol: &Symbol, interval: Interval) -> Result<broadcast::Receiver<Bar>, VenueError>;

    async fn stream_order_book(&self, symbol: &Symbol) -> Result<broadcast::Receiver<OrderBookSnapshot>, VenueError>;

    async fn stream_funding(&self, symbol: &Symbol) -> Result<broadcast::Receiver<FundingRate>, VenueError>;
}

/// Rejects the microstructure path before any network I/O happens
/// (Testable Property 9: aggregator-sourced books never reach the Quality
/// factor).
pub fn require_venue_native(adapter: &dyn VenueAdapter) -> Result<(), VenueError> {
    match adapter.provider_kind() {
        ProviderKind::VenueNative => Ok(()),
        ProviderKind::Aggregator => Err(VenueError::AggregatorBan),
    }
}

/// Session lifecycle for a streaming connection, generalized from
/// `binance_session.rs::SessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.3,
        }
    }
}

/// Exponential backoff with jitter, same xorshift64 PRNG shape as
/// `BackoffCalculator` so reconnect timing stays reproducible under a
/// fixed seed without pulling in a full `rand::Rng` for this hot path.
pub struct ReconnectBackoff {
    config: BackoffConfig,
    attempt: u32,
    rng_state: u64,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig, seed: u64) -> Self {
        Self { config, attempt: 0, rng_state: seed.max(1) }
    }

    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }

    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.config.base.as_millis() as f64;
        let raw = base_ms * self.config.multiplier.powi(self.attempt as i32);
        let capped = raw.min(self.config.max.as_millis() as f64);
        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (self.next_random() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(base_ms);
        self.attempt += 1;
        Duration::from_millis(final_ms as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Tracks per-(venue, stream) connection state and heartbeat staleness, so
/// the facade can decide when a stream needs to be torn down and
/// reconnected (spec.md §5 Concurrency Model).
pub struct StreamSession {
    pub venue: String,
    pub state: ConnectionState,
    pub backoff: ReconnectBackoff,
    last_data_at: Option<Instant>,
    stale_after: Duration,
}

impl StreamSession {
    pub fn new(venue: impl Into<String>, backoff: ReconnectBackoff, stale_after: Duration) -> Self {
        Self {
            venue: venue.into(),
            state: ConnectionState::Disconnected,
            backoff,
            last_data_at: None,
            stale_after,
        }
    }

    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        self.last_data_at = Some(Instant::now());
    }

    pub fn on_data_received(&mut self) {
        self.last_data_at = Some(Instant::now());
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Reconnecting;
        warn!(venue = %self.venue, "stream disconnected, entering reconnect backoff");
    }

    /// True once no data has arrived for `stale_after`; the facade should
    /// treat this like a disconnect even though the socket is still open.
    pub fn is_stale(&self) -> bool {
        match self.last_data_at {
            Some(t) => t.elapsed() > self.stale_after,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let mut b = ReconnectBackoff::new(
            BackoffConfig { base: Duration::from_millis(100), max: Duration::from_millis(400), multiplier: 2.0, jitter_factor: 0.0 },
            42,
        );
        assert_eq!(b.next_delay(), Duration::from_millis(100));
        assert_eq!(b.next_delay(), Duration::from_millis(200));
        assert_eq!(b.next_delay(), Duration::from_millis(400));
        assert_eq!(b.next_delay(), Duration::from_millis(400)); // capped
    }

    #[test]
    fn reset_restarts_from_base() {
        let mut b = ReconnectBackoff::new(
            BackoffConfig { base: Duration::from_millis(100), max: Duration::from_millis(400), multiplier: 2.0, jitter_factor: 0.0 },
            7,
        );
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn stale_session_detected_after_timeout() {
        let backoff = ReconnectBackoff::new(BackoffConfig::default(), 1);
        let mut session = StreamSession::new("binance", backoff, Duration::from_millis(10));
        session.on_connected();
        assert!(!session.is_stale());
        std::thread::sleep(Duration::from_millis(20));
        assert!(session.is_stale());
    }

    struct FakeAggregatorAdapter;

    #[async_trait]
    impl VenueAdapter for FakeAggregatorAdapter {
        fn name(&self) -> &str {
            "fake_aggregator"
        }
        fn provider_kind(&self) -> ProviderKind {
            ProviderKind::Aggregator
        }
        async fn fetch_trades(&self, _s: &Symbol, _l: u32) -> Result<Vec<Trade>, VenueError> {
            unimplemented!()
        }
        async fn fetch_klines(&self, _s: &Symbol, _i: Interval, _l: u32) -> Result<Vec<Bar>, VenueError> {
            unimplemented!()
        }
        async fn fetch_order_book(&self, _s: &Symbol, _d: u32) -> Result<OrderBookSnapshot, VenueError> {
            unimplemented!()
        }
        async fn fetch_funding(&self, _s: &Symbol) -> Result<FundingRate, VenueError> {
            unimplemented!()
        }
        async fn fetch_open_interest(&self, _s: &Symbol) -> Result<OpenInterest, VenueError> {
            unimplemented!()
        }
        async fn stream_trades(&self, _s: &Symbol) -> Result<broadcast::Receiver<Trade>, VenueError> {
            unimplemented!()
        }
        async fn stream_klines(&self, _s: &Symbol, _i: Interval) -> Result<broadcast::Receiver<Bar>, VenueError> {
            unimplemented!()
        }
        async fn stream_order_book(&self, _s: &Symbol) -> Result<broadcast::Receiver<OrderBookSnapshot>, VenueError> {
            unimplemented!()
        }
        async fn stream_funding(&self, _s: &Symbol) -> Result<broadcast::Receiver<FundingRate>, VenueError> {
            unimplemented!()
        }
    }

    #[test]
    fn aggregator_adapter_rejected_before_any_io() {
        let adapter = FakeAggregatorAdapter;
        assert!(matches!(require_venue_native(&adapter), Err(VenueError::AggregatorBan)));
    }
}
