use super::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-(symbol, timestamp) raw factor row produced by the Factor Builder
/// (C7). Invariants are enforced by `validate()`, not by construction,
/// because the builder assembles fields incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFactorRow {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub momentum_core: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
    pub social: f64,
    pub factor_details: HashMap<String, f64>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FactorRowError {
    #[error("{field} is NaN or infinite")]
    NotFinite { field: &'static str },
    #[error("{field} {value} out of [0,100]")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("momentumCore {0} out of [-1000,1000]")]
    MomentumOutOfRange(f64),
}

impl RawFactorRow {
    pub fn validate(&self) -> Result<(), FactorRowError> {
        let checks: [(&'static str, f64); 5] = [
            ("momentumCore", self.momentum_core),
            ("technical", self.technical),
            ("volume", self.volume),
            ("quality", self.quality),
            ("social", self.social),
        ];
        for (field, v) in checks {
            if !v.is_finite() {
                return Err(FactorRowError::NotFinite { field });
            }
        }
        if !(-1000.0..=1000.0).contains(&self.momentum_core) {
            return Err(FactorRowError::MomentumOutOfRange(self.momentum_core));
        }
        for (field, v) in [
            ("technical", self.technical),
            ("volume", self.volume),
            ("quality", self.quality),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(FactorRowError::OutOfUnitRange { field, value: v });
            }
        }
        // social is uncapped raw input by design (spec.md §4.7); capping
        // happens after residualization in the orthogonalizer.
        Ok(())
    }
}

/// Post-Gram-Schmidt row (C8 output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthogonalizedRow {
    pub symbol: Symbol,
    pub momentum_core: f64,
    pub technical_residual: f64,
    pub volume_residual: f64,
    pub quality_residual: f64,
    pub social_capped: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrthogonalityMetrics {
    pub max_pairwise_correlation: f64,
    pub momentum_preservation: f64,
}

/// Final per-symbol scorer output (C9), with weighted attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedContribution {
    pub factor: String,
    pub weight: f64,
    pub value: f64,
    pub contribution: f64,
}
