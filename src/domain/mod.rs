pub mod bar;
pub mod factors;
pub mod funding;
pub mod orderbook;
pub mod symbol;
pub mod trade;

pub use bar::{Bar, BarValidationError, Interval};
pub use factors::{
    FactorRowError, OrthogonalityMetrics, OrthogonalizedRow, RawFactorRow, WeightedContribution,
};
pub use funding::{FundingRate, OpenInterest, OpenInterestDelta};
pub use orderbook::{Level, OrderBookSnapshot, OrderBookValidationError, ProviderKind};
pub use symbol::{Symbol, Universe, UniverseEntry};
pub use trade::{Trade, TradeSide, TradeValidationError};
