//! Regime Detector (C6).
//!
//! Process-wide single-writer state: a timer task commits a new
//! `RegimeSnapshot` every cadence; readers load an atomic snapshot and
//! never lock, following the `arc_swap::ArcSwap` idiom already used by
//! `scrapers/polymarket_book_store.rs` for lock-free reads.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Regime {
    TrendingBull,
    #[default]
    Choppy,
    HighVol,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub vol_low: f64,
    pub vol_high: f64,
    pub bull: f64,
    pub bear: f64,
    pub thrust: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            vol_low: 0.30,
            vol_high: 0.60,
            bull: 0.65,
            bear: 0.35,
            thrust: 0.15,
        }
    }
}

/// The three sampled indicators (spec.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct RegimeIndicators {
    pub realized_vol_7d: f64,
    pub breadth_pct_above_20ma: f64,
    pub breadth_thrust: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Bull,
    Bear,
    HighVol,
    Chop,
}

/// Each indicator votes independently; strict inequality required to vote
/// non-CHOPPY (Testable Property 5).
fn vote_volatility(realized_vol_7d: f64, t: &RegimeThresholds) -> Vote {
    if realized_vol_7d > t.vol_high {
        Vote::HighVol
    } else if realized_vol_7d < t.vol_low {
        // low vol alone doesn't vote bull/bear; it abstains to chop.
        Vote::Chop
    } else {
        Vote::Chop
    }
}

fn vote_breadth(breadth_pct_above_20ma: f64, t: &RegimeThresholds) -> Vote {
    if breadth_pct_above_20ma > t.bull {
        Vote::Bull
    } else if breadth_pct_above_20ma < t.bear {
        Vote::Bear
    } else {
        Vote::Chop
    }
}

fn vote_thrust(breadth_thrust: f64, t: &RegimeThresholds) -> Vote {
    if breadth_thrust > t.thrust {
        Vote::Bull
    } else if breadth_thrust < -t.thrust {
        Vote::Bear
    } else {
        Vote::Chop
    }
}

/// Majority vote over the three indicators; three-way tie votes CHOPPY.
pub fn classify(indicators: RegimeIndicators, thresholds: &RegimeThresholds) -> Regime {
    let votes = [
        vote_volatility(indicators.realized_vol_7d, thresholds),
        vote_breadth(indicators.breadth_pct_above_20ma, thresholds),
        vote_thrust(indicators.breadth_thrust, thresholds),
    ];

    if votes.contains(&Vote::HighVol) {
        let high_vol_votes = votes.iter().filter(|v| **v == Vote::HighVol).count();
        if high_vol_votes * 2 > votes.len() {
            return Regime::HighVol;
        }
    }

    let bull = votes.iter().filter(|v| **v == Vote::Bull).count();
    let bear = votes.iter().filter(|v| **v == Vote::Bear).count();
    let chop = votes.iter().filter(|v| **v == Vote::Chop).count();
    let high_vol = votes.iter().filter(|v| **v == Vote::HighVol).count();

    let max = bull.max(bear).max(chop).max(high_vol);
    let winners = [bull == max, bear == max, chop == max, high_vol == max]
        .iter()
        .filter(|w| **w)
        .count();

    if winners > 1 {
        return Regime::Choppy; // tie → CHOPPY
    }
    if bull == max {
        Regime::TrendingBull
    } else if high_vol == max {
        Regime::HighVol
    } else {
        Regime::Choppy
    }
}

/// Multi-timeframe weight blend; `w7d` active only in TRENDING_BULL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBlend {
    pub w1h: f64,
    pub w4h: f64,
    pub w12h: f64,
    pub w24h: f64,
    pub w7d: f64,
}

impl WeightBlend {
    pub fn active_sum(&self, regime: Regime) -> f64 {
        let mut s = self.w1h + self.w4h + self.w12h + self.w24h;
        if regime == Regime::TrendingBull {
            s += self.w7d;
        }
        s
    }

    pub fn normalized(&self, regime: Regime) -> WeightBlend {
        let sum = self.active_sum(regime);
        if sum <= 0.0 {
            return *self;
        }
        let w7d = if regime == Regime::TrendingBull { self.w7d / sum } else { 0.0 };
        WeightBlend {
            w1h: self.w1h / sum,
            w4h: self.w4h / sum,
            w12h: self.w12h / sum,
            w24h: self.w24h / sum,
            w7d,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightBlends {
    pub trending_bull: WeightBlend,
    pub choppy: WeightBlend,
    pub high_vol: WeightBlend,
}

impl Default for WeightBlends {
    fn default() -> Self {
        Self {
            trending_bull: WeightBlend { w1h: 0.10, w4h: 0.20, w12h: 0.20, w24h: 0.25, w7d: 0.25 },
            choppy: WeightBlend { w1h: 0.30, w4h: 0.30, w12h: 0.25, w24h: 0.15, w7d: 0.0 },
            high_vol: WeightBlend { w1h: 0.40, w4h: 0.30, w12h: 0.20, w24h: 0.10, w7d: 0.0 },
        }
    }
}

impl WeightBlends {
    pub fn for_regime(&self, regime: Regime) -> WeightBlend {
        match regime {
            Regime::TrendingBull => self.trending_bull,
            Regime::Choppy => self.choppy,
            Regime::HighVol => self.high_vol,
        }
        .normalized(regime)
    }
}

/// Atomic (regime, confidence, committedAt) tuple read by downstream
/// consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: Regime,
    pub confidence: f64,
    pub committed_at_unix: i64,
}

impl Default for RegimeSnapshot {
    fn default() -> Self {
        Self {
            regime: Regime::Choppy,
            confidence: 1.0,
            committed_at_unix: 0,
        }
    }
}

/// Stability filter: a proposed regime is only committed once it is the
/// majority across a short rolling window of votes; otherwise the previous
/// regime persists.
pub struct RegimeDetector {
    thresholds: RegimeThresholds,
    window: VecDeque<Regime>,
    window_len: usize,
    snapshot: Arc<ArcSwap<RegimeSnapshot>>,
}

impl RegimeDetector {
    pub fn new(thresholds: RegimeThresholds, window_len: usize) -> Self {
        Self {
            thresholds,
            window: VecDeque::with_capacity(window_len),
            window_len: window_len.max(1),
            snapshot: Arc::new(ArcSwap::from_pointee(RegimeSnapshot::default())),
        }
    }

    pub fn snapshot_handle(&self) -> Arc<ArcSwap<RegimeSnapshot>> {
        self.snapshot.clone()
    }

    pub fn current(&self) -> RegimeSnapshot {
        **self.snapshot.load()
    }

    /// Sample indicators on the 4h cadence and potentially commit a new
    /// regime. Returns the committed (possibly unchanged) snapshot.
    pub fn sample(&mut self, indicators: RegimeIndicators, now_unix: i64) -> RegimeSnapshot {
        let proposed = classify(indicators, &self.thresholds);

        if self.window.len() >= self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(proposed);

        let majority = majority_of(&self.window);
        let prev = self.current();

        let committed = match majority {
            Some(m) if self.window.len() == self.window_len => RegimeSnapshot {
                regime: m,
                confidence: agreement_fraction(&self.window, m),
                committed_at_unix: now_unix,
            },
            _ => prev, // window not full yet or no majority: hold previous
        };

        self.snapshot.store(Arc::new(committed));
        committed
    }
}

fn majority_of(window: &VecDeque<Regime>) -> Option<Regime> {
    if window.is_empty() {
        return None;
    }
    let mut counts = [0usize; 3];
    for r in window {
        counts[*r as usize] += 1;
    }
    let max = *counts.iter().max().unwrap();
    let winners = counts.iter().filter(|c| **c == max).count();
    if winners > 1 {
        return Some(Regime::Choppy);
    }
    if counts[Regime::TrendingBull as usize] == max {
        Some(Regime::TrendingBull)
    } else if counts[Regime::HighVol as usize] == max {
        Some(Regime::HighVol)
    } else {
        Some(Regime::Choppy)
    }
}

fn agreement_fraction(window: &VecDeque<Regime>, regime: Regime) -> f64 {
    let matching = window.iter().filter(|r| **r == regime).count();
    matching as f64 / window.len() as f64
}

// SAFETY note: Regime used as an array index above requires a stable
// discriminant ordering; tests pin that ordering.
impl From<Regime> for usize {
    fn from(r: Regime) -> usize {
        r as usize
    }
}
