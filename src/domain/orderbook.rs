use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub quantity: f64,
}

/// Classifies where a quote originated, to enforce the aggregator ban
/// (spec.md §3 hard constraint, §4.1, §4.9 invariant 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Direct exchange feed — eligible for microstructure gating.
    VenueNative,
    /// Cross-venue aggregator — forbidden on the microstructure path.
    Aggregator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: String,
    pub provider: ProviderKind,
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub last_update_id: u64,
    pub is_l2: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderBookValidationError {
    #[error("bids not strictly descending in price at index {0}")]
    BidsNotDescending(usize),
    #[error("asks not strictly ascending in price at index {0}")]
    AsksNotAscending(usize),
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: String, ask: String },
    #[error("non-positive quantity at {side} level {index}")]
    NonPositiveQuantity { side: &'static str, index: usize },
}

impl OrderBookSnapshot {
    pub fn validate(&self) -> Result<(), OrderBookValidationError> {
        for (i, w) in self.bids.windows(2).enumerate() {
            if w[0].price <= w[1].price {
                return Err(OrderBookValidationError::BidsNotDescending(i + 1));
            }
        }
        for (i, w) in self.asks.windows(2).enumerate() {
            if w[0].price >= w[1].price {
                return Err(OrderBookValidationError::AsksNotAscending(i + 1));
            }
        }
        for (i, l) in self.bids.iter().enumerate() {
            if l.quantity <= 0.0 {
                return Err(OrderBookValidationError::NonPositiveQuantity { side: "bid", index: i });
            }
        }
        for (i, l) in self.asks.iter().enumerate() {
            if l.quantity <= 0.0 {
                return Err(OrderBookValidationError::NonPositiveQuantity { side: "ask", index: i });
            }
        }
        if let (Some(bid0), Some(ask0)) = (self.bids.first(), self.asks.first()) {
            if bid0.price >= ask0.price {
                return Err(OrderBookValidationError::Crossed {
                    bid: bid0.price.to_string(),
                    ask: ask0.price.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.bids.first()?.price;
        let ask = self.asks.first()?.price;
        Some((bid + ask) / 2.0)
    }

    /// Spread in basis points, required for the Quality factor and the
    /// liquidity guard.
    pub fn spread_bps(&self) -> Option<f64> {
        let bid = self.bids.first()?.price;
        let ask = self.asks.first()?.price;
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 {
            return None;
        }
        Some((ask - bid) / mid * 10_000.0)
    }

    /// Quote-currency depth within `pct` of mid, both sides summed.
    pub fn depth_within_pct(&self, pct: f64) -> Option<f64> {
        let mid = self.mid_price()?;
        let lo = mid * (1.0 - pct);
        let hi = mid * (1.0 + pct);
        let bid_depth: f64 = self
            .bids
            .iter()
            .filter(|l| l.price >= lo)
            .map(|l| l.price * l.quantity)
            .sum();
        let ask_depth: f64 = self
            .asks
            .iter()
            .filter(|l| l.price <= hi)
            .map(|l| l.price * l.quantity)
            .sum();
        Some(bid_depth + ask_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "binance".into(),
            provider: ProviderKind::VenueNative,
            symbol: Symbol::new("BTC", "USD"),
            timestamp: Utc::now(),
            bids: bids.into_iter().map(|(price, quantity)| Level { price, quantity }).collect(),
            asks: asks.into_iter().map(|(price, quantity)| Level { price, quantity }).collect(),
            last_update_id: 1,
            is_l2: true,
        }
    }

    #[test]
    fn valid_book_passes() {
        let b = book(vec![(100.0, 1.0), (99.0, 2.0)], vec![(101.0, 1.0), (102.0, 2.0)]);
        assert!(b.validate().is_ok());
        assert_eq!(b.mid_price(), Some(100.5));
    }

    #[test]
    fn crossed_book_rejected() {
        let b = book(vec![(101.0, 1.0)], vec![(100.0, 1.0)]);
        assert!(matches!(b.validate(), Err(OrderBookValidationError::Crossed { .. })));
    }

    #[test]
    fn non_descending_bids_rejected() {
        let b = book(vec![(100.0, 1.0), (100.0, 1.0)], vec![(101.0, 1.0)]);
        assert!(matches!(b.validate(), Err(OrderBookValidationError::BidsNotDescending(_))));
    }

    #[test]
    fn zero_quantity_rejected() {
        let b = book(vec![(100.0, 0.0)], vec![(101.0, 1.0)]);
        assert!(matches!(
            b.validate(),
            Err(OrderBookValidationError::NonPositiveQuantity { side: "bid", .. })
        ));
    }

    #[test]
    fn spread_bps_matches_expected() {
        let b = book(vec![(100.0, 1.0)], vec![(101.0, 1.0)]);
        let bps = b.spread_bps().unwrap();
        assert!((bps - 99.50248756218906).abs() < 1e-6);
    }
}
