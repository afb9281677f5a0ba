use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-independent ticker (base + quote). Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Parse a combined ticker like "BTCUSD" given a known quote currency.
    pub fn parse_with_quote(ticker: &str, quote: &str) -> Option<Self> {
        let ticker = ticker.to_uppercase();
        let quote = quote.to_uppercase();
        let base = ticker.strip_suffix(&quote)?;
        if base.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// Ordered set of symbols with per-symbol average daily volume estimates.
/// Rebuilt by an external pairs-discovery collaborator; read-only to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    entries: Vec<UniverseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub symbol: Symbol,
    /// Average daily volume estimate, quote currency.
    pub adv_quote: f64,
}

impl Universe {
    pub fn new(mut entries: Vec<UniverseEntry>) -> Self {
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Self { entries }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter().map(|e| &e.symbol)
    }

    pub fn entries(&self) -> &[UniverseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn adv_for(&self, symbol: &Symbol) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| &e.symbol == symbol)
            .map(|e| e.adv_quote)
    }
}
