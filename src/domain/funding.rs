use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Negative rates permitted (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: String,
    pub symbol: Symbol,
    pub rate: f64,
    pub next_funding_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    pub venue: String,
    pub symbol: Symbol,
    pub oi: f64,
    pub notional: f64,
    pub timestamp_unix: i64,
}

/// Δoi = oi_now - oi_prev, with a validity flag set false when either
/// snapshot is missing (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenInterestDelta {
    pub delta: f64,
    pub valid: bool,
}

impl OpenInterestDelta {
    pub fn compute(prev: Option<OpenInterest>, now: Option<OpenInterest>) -> Self {
        match (prev, now) {
            (Some(p), Some(n)) => Self {
                delta: n.oi - p.oi,
                valid: true,
            },
            _ => Self { delta: 0.0, valid: false },
        }
    }
}
