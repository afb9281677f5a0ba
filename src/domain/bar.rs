use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
    H1,
    H4,
    H12,
    H24,
    D7,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::H12 => "12h",
            Interval::H24 => "24h",
            Interval::D7 => "7d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single OHLCV bar sourced from one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub venue: String,
    pub symbol: Symbol,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BarValidationError {
    #[error("closeTime {close:?} not after openTime {open:?}")]
    BadTimeOrder { open: String, close: String },
    #[error("high {high} below max(open,close,low) {expected}")]
    HighTooLow { high: String, expected: String },
    #[error("low {low} above min(open,close,high) {expected}")]
    LowTooHigh { low: String, expected: String },
    #[error("negative volume {0}")]
    NegativeVolume(String),
}

impl Bar {
    /// Validate the invariants from spec.md §3: closeTime > openTime;
    /// h >= max(o,c,l); l <= min(o,c,h); v >= 0.
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if self.close_time <= self.open_time {
            return Err(BarValidationError::BadTimeOrder {
                open: self.open_time.to_rfc3339(),
                close: self.close_time.to_rfc3339(),
            });
        }
        let max_ocl = self.open.max(self.close).max(self.low);
        if self.high < max_ocl {
            return Err(BarValidationError::HighTooLow {
                high: self.high.to_string(),
                expected: max_ocl.to_string(),
            });
        }
        let min_och = self.open.min(self.close).min(self.high);
        if self.low > min_och {
            return Err(BarValidationError::LowTooHigh {
                low: self.low.to_string(),
                expected: min_och.to_string(),
            });
        }
        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bar(o: f64, h: f64, l: f64, c: f64, v: f64) -> Bar {
        let open_time = Utc::now();
        Bar {
            venue: "binance".into(),
            symbol: Symbol::new("BTC", "USD"),
            interval: Interval::H1,
            open_time,
            close_time: open_time + Duration::hours(1),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
            quote_volume: v * c,
            trade_count: 10,
        }
    }

    #[test]
    fn valid_bar_passes() {
        assert!(bar(100.0, 110.0, 95.0, 105.0, 10.0).validate().is_ok());
    }

    #[test]
    fn high_below_close_rejected() {
        assert!(matches!(
            bar(100.0, 101.0, 95.0, 105.0, 10.0).validate(),
            Err(BarValidationError::HighTooLow { .. })
        ));
    }

    #[test]
    fn negative_volume_rejected() {
        assert!(matches!(
            bar(100.0, 110.0, 95.0, 105.0, -1.0).validate(),
            Err(BarValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn bad_time_order_rejected() {
        let mut b = bar(100.0, 110.0, 95.0, 105.0, 10.0);
        b.close_time = b.open_time;
        assert!(matches!(b.validate(), Err(BarValidationError::BadTimeOrder { .. })));
    }
}
