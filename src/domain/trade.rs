use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single executed trade from one venue (spec.md §3 Data Model,
/// the HOT-tier counterpart to `Bar`'s pulled OHLCV aggregation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub venue: String,
    pub symbol: Symbol,
    pub trade_id: u64,
    pub price: f64,
    pub quantity: f64,
    pub side: TradeSide,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TradeValidationError {
    #[error("non-positive price {0}")]
    NonPositivePrice(String),
    #[error("non-positive quantity {0}")]
    NonPositiveQuantity(String),
}

impl Trade {
    pub fn validate(&self) -> Result<(), TradeValidationError> {
        if self.price <= 0.0 {
            return Err(TradeValidationError::NonPositivePrice(self.price.to_string()));
        }
        if self.quantity <= 0.0 {
            return Err(TradeValidationError::NonPositiveQuantity(self.quantity.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(price: f64, quantity: f64) -> Trade {
        Trade {
            venue: "binance".to_string(),
            symbol: Symbol::new("BTC", "USD"),
            trade_id: 1,
            price,
            quantity,
            side: TradeSide::Buy,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn valid_trade_passes() {
        assert!(trade(100.0, 1.5).validate().is_ok());
    }

    #[test]
    fn non_positive_price_rejected() {
        assert!(matches!(trade(0.0, 1.0).validate(), Err(TradeValidationError::NonPositivePrice(_))));
    }

    #[test]
    fn non_positive_quantity_rejected() {
        assert!(matches!(trade(100.0, 0.0).validate(), Err(TradeValidationError::NonPositiveQuantity(_))));
    }
}
