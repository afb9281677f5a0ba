//! Data Facade (C5).
//!
//! The single entry point the rest of the system talks to: callers ask for
//! bars, books, funding or open interest by (venue, symbol) and the facade
//! decides whether to serve from cache, whether the venue's breaker admits
//! the call, how to rate-limit it, and which venue to fall back to. Every
//! served fetch is snapshotted into the PIT store for replay. Grounded on
//! `scrapers/mod.rs`'s role as the thin coordinating layer over per-venue
//! scrapers, generalized into a venue-agnostic facade with the
//! limiter/breaker/cache discipline spelled out in spec.md §4.2-§4.5.

pub mod breaker;
pub mod cache;
pub mod limiter;
pub mod pit;
pub mod venue;

use crate::domain::{Bar, FundingRate, Interval, OpenInterest, OrderBookSnapshot, Symbol, Trade};
use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use cache::{cache_key, DataType, TtlCache};
use chrono::Utc;
use limiter::{RateLimitConfig, RateLimiter};
use pit::{PitStore, PitStoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use venue::{require_venue_native, BackoffConfig, ReconnectBackoff, StreamSession, VenueAdapter, VenueError};

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    RateLimited(#[from] limiter::RateLimitError),
    #[error("PROVIDER_DEGRADED: {0} breaker is open")]
    ProviderDegraded(String),
    #[error(transparent)]
    Venue(#[from] VenueError),
    #[error("no venue available for {0}")]
    NoVenueAvailable(String),
    #[error(transparent)]
    Pit(#[from] PitStoreError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VenueHealth {
    pub breaker_state: BreakerStateDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerStateDto {
    Closed,
    Open,
    HalfOpen,
}

impl From<BreakerState> for BreakerStateDto {
    fn from(s: BreakerState) -> Self {
        match s {
            BreakerState::Closed => BreakerStateDto::Closed,
            BreakerState::Open => BreakerStateDto::Open,
            BreakerState::HalfOpen => BreakerStateDto::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacadeMetrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetches_served: u64,
    pub fallbacks_used: u64,
    pub rejections: u64,
}

struct VenueEntry {
    adapter: Box<dyn VenueAdapter>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

/// Ordered by priority; the first entry is the primary venue for a symbol,
/// later entries are the explicit (not load-balanced) fallback chain
/// (spec.md §9 Open Question 4).
pub struct DataFacade {
    venues: Vec<VenueEntry>,
    cache: TtlCache,
    pit: PitStore,
    metrics: Mutex<FacadeMetrics>,
    /// One session per (venue, stream-kind, symbol), tracking connection
    /// state and reconnect backoff for the HOT tier (spec.md §5).
    streams: Mutex<HashMap<String, StreamSession>>,
}

impl DataFacade {
    pub fn new(
        venues: Vec<(Box<dyn VenueAdapter>, RateLimitConfig, BreakerConfig)>,
        pit_root: impl Into<std::path::PathBuf>,
    ) -> Result<Self, FacadeError> {
        let venues = venues
            .into_iter()
            .map(|(adapter, rl_cfg, breaker_cfg)| {
                let name = adapter.name().to_string();
                VenueEntry {
                    limiter: RateLimiter::new(rl_cfg),
                    breaker: CircuitBreaker::new(name, breaker_cfg),
                    adapter,
                }
            })
            .collect();
        Ok(Self {
            venues,
            cache: TtlCache::new(),
            pit: PitStore::open(pit_root)?,
            metrics: Mutex::new(FacadeMetrics::default()),
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub fn metrics(&self) -> FacadeMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub fn venue_health(&self) -> HashMap<String, VenueHealth> {
        self.venues
            .iter()
            .map(|v| (v.adapter.name().to_string(), VenueHealth { breaker_state: v.breaker.state().into() }))
            .collect()
    }

    /// Ordered fallback chain of venue names whose breaker is not Open,
    /// starting from the primary. Used by callers who want to know which
    /// venue actually served a request.
    fn admissible_chain(&self) -> Vec<&VenueEntry> {
        self.venues.iter().filter(|v| v.breaker.state() != BreakerState::Open).collect()
    }

    /// Doubles a venue's effective cache TTL while its breaker is Open and
    /// resets it once the breaker leaves that state (spec.md §4.2, §4.3,
    /// Testable Scenario S7). Called after every breaker outcome recording.
    fn sync_cache_doubling(&self, entry: &VenueEntry) {
        self.cache.set_doubled(entry.adapter.name(), entry.breaker.state() == BreakerState::Open);
    }

    /// The venue whose breaker state gates cache TTL doubling for entries
    /// not tied to a specific serving venue (the cache itself is shared
    /// across the fallback chain, keyed only by symbol/params).
    fn primary_venue_name(&self) -> &str {
        self.venues.first().map(|v| v.adapter.name()).unwrap_or("any")
    }

    fn stream_key(venue: &str, kind: &str, symbol: &Symbol) -> String {
        format!("{venue}:{kind}:{symbol}")
    }

    fn record_stream_connected(&self, venue: &str, kind: &str, symbol: &Symbol) {
        let key = Self::stream_key(venue, kind, symbol);
        let mut streams = self.streams.lock().unwrap();
        let session = streams
            .entry(key)
            .or_insert_with(|| StreamSession::new(venue, ReconnectBackoff::new(BackoffConfig::default(), 1), Duration::from_secs(30)));
        session.on_connected();
    }

    /// True once any tracked stream has gone stale (no data within its
    /// configured window), a signal the supervisor should reconnect it.
    pub fn stale_streams(&self) -> Vec<String> {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.is_stale())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Fetch path: cache -> limiter -> breaker -> adapter -> cache+PIT ->
    /// return. Falls back through the venue chain in priority order on
    /// transport failure; never load-balances (spec.md §9 Open Question 4).
    pub async fn fetch_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        run_id: &str,
    ) -> Result<Vec<Bar>, FacadeError> {
        let params = format!("{interval}:{limit}");
        let key = cache_key("any", "klines", &format!("{symbol}:{params}"));
        if let Some(bytes) = self.cache.get(self.primary_venue_name(), &key) {
            self.metrics.lock().unwrap().cache_hits += 1;
            let bars: Vec<Bar> = serde_json::from_slice(&bytes).unwrap_or_default();
            return Ok(bars);
        }
        self.metrics.lock().unwrap().cache_misses += 1;

        let chain = self.admissible_chain();
        if chain.is_empty() {
            return Err(FacadeError::NoVenueAvailable("klines".to_string()));
        }

        let mut last_err = None;
        for (idx, entry) in chain.iter().enumerate() {
            if idx > 0 {
                self.metrics.lock().unwrap().fallbacks_used += 1;
            }
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.fetch_klines(symbol, interval, limit).await {
                Ok(bars) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    let bytes = serde_json::to_vec(&bars).unwrap_or_default();
                    self.cache.put(cache_key("any", "klines", &format!("{symbol}:{params}")), bytes.clone(), DataType::Klines.default_ttl());
                    self.pit.put_snapshot(
                        "bars",
                        entry.adapter.name(),
                        &symbol.to_string(),
                        "klines",
                        Utc::now(),
                        run_id,
                        &bytes,
                    )?;
                    self.metrics.lock().unwrap().fetches_served += 1;
                    return Ok(bars);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        self.metrics.lock().unwrap().rejections += 1;
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("klines".to_string())))
    }

    /// Order-book fetch enforces the venue-native-only microstructure path
    /// before touching the network (Testable Property 9).
    pub async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: u32,
        run_id: &str,
    ) -> Result<OrderBookSnapshot, FacadeError> {
        let chain = self.admissible_chain();
        if chain.is_empty() {
            return Err(FacadeError::NoVenueAvailable("order_book".to_string()));
        }
        let mut last_err = None;
        for (idx, entry) in chain.iter().enumerate() {
            require_venue_native(entry.adapter.as_ref())?;
            if idx > 0 {
                self.metrics.lock().unwrap().fallbacks_used += 1;
            }
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.fetch_order_book(symbol, depth).await {
                Ok(book) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    let bytes = serde_json::to_vec(&book).unwrap_or_default();
                    self.pit.put_snapshot("books", entry.adapter.name(), &symbol.to_string(), "order_book", Utc::now(), run_id, &bytes)?;
                    self.metrics.lock().unwrap().fetches_served += 1;
                    return Ok(book);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        self.metrics.lock().unwrap().rejections += 1;
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("order_book".to_string())))
    }

    pub async fn fetch_funding(&self, symbol: &Symbol, run_id: &str) -> Result<FundingRate, FacadeError> {
        let chain = self.admissible_chain();
        for entry in &chain {
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.fetch_funding(symbol).await {
                Ok(f) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    let bytes = serde_json::to_vec(&f).unwrap_or_default();
                    self.pit.put_snapshot("funding", entry.adapter.name(), &symbol.to_string(), "funding", Utc::now(), run_id, &bytes)?;
                    return Ok(f);
                }
                Err(_) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                }
            }
        }
        Err(FacadeError::NoVenueAvailable("funding".to_string()))
    }

    pub async fn fetch_open_interest(&self, symbol: &Symbol, run_id: &str) -> Result<OpenInterest, FacadeError> {
        let chain = self.admissible_chain();
        for entry in &chain {
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.fetch_open_interest(symbol).await {
                Ok(oi) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    let bytes = serde_json::to_vec(&oi).unwrap_or_default();
                    self.pit.put_snapshot("oi", entry.adapter.name(), &symbol.to_string(), "open_interest", Utc::now(), run_id, &bytes)?;
                    return Ok(oi);
                }
                Err(_) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                }
            }
        }
        Err(FacadeError::NoVenueAvailable("open_interest".to_string()))
    }

    /// WARM pull path for trades, same cache/limiter/breaker discipline as
    /// `fetch_klines`.
    pub async fn fetch_trades(&self, symbol: &Symbol, limit: u32, run_id: &str) -> Result<Vec<Trade>, FacadeError> {
        let key = cache_key("any", "trades", &format!("{symbol}:{limit}"));
        if let Some(bytes) = self.cache.get(self.primary_venue_name(), &key) {
            self.metrics.lock().unwrap().cache_hits += 1;
            let trades: Vec<Trade> = serde_json::from_slice(&bytes).unwrap_or_default();
            return Ok(trades);
        }
        self.metrics.lock().unwrap().cache_misses += 1;

        let chain = self.admissible_chain();
        if chain.is_empty() {
            return Err(FacadeError::NoVenueAvailable("trades".to_string()));
        }

        let mut last_err = None;
        for (idx, entry) in chain.iter().enumerate() {
            if idx > 0 {
                self.metrics.lock().unwrap().fallbacks_used += 1;
            }
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.fetch_trades(symbol, limit).await {
                Ok(trades) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    let bytes = serde_json::to_vec(&trades).unwrap_or_default();
                    self.cache.put(key.clone(), bytes.clone(), DataType::Trades.default_ttl());
                    self.pit.put_snapshot("trades", entry.adapter.name(), &symbol.to_string(), "trades", Utc::now(), run_id, &bytes)?;
                    self.metrics.lock().unwrap().fetches_served += 1;
                    return Ok(trades);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        self.metrics.lock().unwrap().rejections += 1;
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("trades".to_string())))
    }

    /// HOT streaming path: opens the first admissible venue's trade
    /// stream and tracks its connection in a `StreamSession` (spec.md §2,
    /// §4.1, §5).
    pub async fn stream_trades(&self, symbol: &Symbol) -> Result<broadcast::Receiver<Trade>, FacadeError> {
        let chain = self.admissible_chain();
        let mut last_err = None;
        for entry in &chain {
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.stream_trades(symbol).await {
                Ok(rx) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    self.record_stream_connected(entry.adapter.name(), "trades", symbol);
                    return Ok(rx);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("trades_stream".to_string())))
    }

    pub async fn stream_klines(&self, symbol: &Symbol, interval: Interval) -> Result<broadcast::Receiver<Bar>, FacadeError> {
        let chain = self.admissible_chain();
        let mut last_err = None;
        for entry in &chain {
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.stream_klines(symbol, interval).await {
                Ok(rx) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    self.record_stream_connected(entry.adapter.name(), "klines", symbol);
                    return Ok(rx);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("klines_stream".to_string())))
    }

    pub async fn stream_order_book(&self, symbol: &Symbol) -> Result<broadcast::Receiver<OrderBookSnapshot>, FacadeError> {
        let chain = self.admissible_chain();
        let mut last_err = None;
        for entry in &chain {
            require_venue_native(entry.adapter.as_ref())?;
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.stream_order_book(symbol).await {
                Ok(rx) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    self.record_stream_connected(entry.adapter.name(), "order_book", symbol);
                    return Ok(rx);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("order_book_stream".to_string())))
    }

    pub async fn stream_funding(&self, symbol: &Symbol) -> Result<broadcast::Receiver<FundingRate>, FacadeError> {
        let chain = self.admissible_chain();
        let mut last_err = None;
        for entry in &chain {
            entry.limiter.try_acquire()?;
            if entry.breaker.before_call().is_err() {
                continue;
            }
            match entry.adapter.stream_funding(symbol).await {
                Ok(rx) => {
                    entry.breaker.record_success();
                    self.sync_cache_doubling(entry);
                    self.record_stream_connected(entry.adapter.name(), "funding", symbol);
                    return Ok(rx);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    self.sync_cache_doubling(entry);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(FacadeError::Venue).unwrap_or_else(|| FacadeError::NoVenueAvailable("funding_stream".to_string())))
    }
}
