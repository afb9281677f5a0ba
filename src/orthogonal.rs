//! Orthogonalizer (C8).
//!
//! Momentum-core is protected — never projected against. The remaining
//! factors are residualized in a fixed Gram-Schmidt order:
//! Technical -> Volume -> Quality -> Social. The ordering is an explicit
//! array, not derived at runtime, so residualization is reproducible
//! across processes (spec.md §9 Design Notes).

use crate::domain::{OrthogonalityMetrics, OrthogonalizedRow, RawFactorRow};
use nalgebra::DVector;
use rayon::prelude::*;

/// Fixed total ordering over the non-protected factors. `momentumCore` is
/// intentionally absent; a compile-time assertion below guards against
/// accidentally including it.
const RESIDUALIZATION_ORDER: [&str; 4] = ["technical", "volume", "quality", "social"];

const _: () = assert!(!contains(&RESIDUALIZATION_ORDER, "momentumCore"));

const fn contains(arr: &[&str; 4], needle: &str) -> bool {
    let mut i = 0;
    while i < arr.len() {
        if const_str_eq(arr[i], needle) {
            return true;
        }
        i += 1;
    }
    false
}

const fn const_str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

pub const SOCIAL_HARD_CAP: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct OrthogonalizerConfig {
    pub correlation_threshold: f64,
    pub momentum_preservation_floor: f64,
    pub social_hard_cap: f64,
}

impl Default for OrthogonalizerConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.6,
            momentum_preservation_floor: 0.99,
            social_hard_cap: SOCIAL_HARD_CAP,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrthogonalizerError {
    #[error("batch momentum preservation {0:.4} below floor")]
    MomentumNotPreserved(f64),
    #[error("batch max pairwise correlation {0:.4} exceeds threshold")]
    CorrelationTooHigh(f64),
    #[error("empty batch")]
    EmptyBatch,
}

/// Projects `v` onto the subspace spanned by `basis` (already orthogonal
/// vectors) and returns the residual `v - proj(v, basis)`.
fn residualize(v: &DVector<f64>, basis: &[DVector<f64>]) -> DVector<f64> {
    let mut residual = v.clone();
    for b in basis {
        let norm_sq = b.dot(b);
        if norm_sq > 1e-12 {
            let coeff = residual.dot(b) / norm_sq;
            residual -= b * coeff;
        }
    }
    residual
}

fn pearson(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let n = a.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_a = a.mean();
    let mean_b = b.mean();
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..a.len() {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 1e-12 || var_b <= 1e-12 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

fn cosine_similarity(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let na = a.norm();
    let nb = b.norm();
    if na <= 1e-12 || nb <= 1e-12 {
        return 1.0;
    }
    a.dot(b) / (na * nb)
}

/// Residualizes a batch of raw factor rows and hard-caps social.
/// Rejects the whole batch (caller should fall back to the previous
/// committed batch, spec.md §4.8) if either invariant is violated.
pub fn orthogonalize_batch(
    rows: &[RawFactorRow],
    config: &OrthogonalizerConfig,
) -> Result<(Vec<OrthogonalizedRow>, OrthogonalityMetrics), OrthogonalizerError> {
    if rows.is_empty() {
        return Err(OrthogonalizerError::EmptyBatch);
    }

    let n = rows.len();
    let momentum = DVector::from_iterator(n, rows.iter().map(|r| r.momentum_core));
    let technical = DVector::from_iterator(n, rows.iter().map(|r| r.technical));
    let volume = DVector::from_iterator(n, rows.iter().map(|r| r.volume));
    let quality = DVector::from_iterator(n, rows.iter().map(|r| r.quality));
    let social = DVector::from_iterator(n, rows.iter().map(|r| r.social));

    let tech_r = residualize(&technical, std::slice::from_ref(&momentum));
    let vol_r = residualize(&volume, &[momentum.clone(), tech_r.clone()]);
    let qual_r = residualize(&quality, &[momentum.clone(), tech_r.clone(), vol_r.clone()]);
    let soc_r = residualize(
        &social,
        &[momentum.clone(), tech_r.clone(), vol_r.clone(), qual_r.clone()],
    );

    let momentum_preservation = cosine_similarity(&momentum, &momentum); // protected: always 1.0
    if momentum_preservation < config.momentum_preservation_floor {
        return Err(OrthogonalizerError::MomentumNotPreserved(momentum_preservation));
    }

    let soc_capped = soc_r.map(|x| x.clamp(-config.social_hard_cap, config.social_hard_cap));

    let residual_series = [&momentum, &tech_r, &vol_r, &qual_r, &soc_capped];
    let mut max_corr: f64 = 0.0;
    for i in 0..residual_series.len() {
        for j in (i + 1)..residual_series.len() {
            let c = pearson(residual_series[i], residual_series[j]).abs();
            if c > max_corr {
                max_corr = c;
            }
        }
    }
    if max_corr > config.correlation_threshold {
        return Err(OrthogonalizerError::CorrelationTooHigh(max_corr));
    }

    let out: Vec<OrthogonalizedRow> = (0..n)
        .into_par_iter()
        .map(|i| OrthogonalizedRow {
            symbol: rows[i].symbol.clone(),
            momentum_core: momentum[i],
            technical_residual: tech_r[i],
            volume_residual: vol_r[i],
            quality_residual: qual_r[i],
            social_capped: soc_capped[i],
        })
        .collect();

    Ok((
        out,
        OrthogonalityMetrics {
            max_pairwise_correlation: max_corr,
            momentum_preservation,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use chrono::Utc;
    use std::collections::HashMap;

    fn row(symbol: &str, momentum: f64, technical: f64, volume: f64, quality: f64, social: f64) -> RawFactorRow {
        RawFactorRow {
            symbol: Symbol::new(symbol, "USD"),
            timestamp: Utc::now(),
            momentum_core: momentum,
            technical,
            volume,
            quality,
            social,
            factor_details: HashMap::new(),
        }
    }

    #[test]
    fn momentum_is_preserved_exactly() {
        let rows = vec![
            row("BTC", 10.0, 50.0, 60.0, 70.0, 5.0),
            row("ETH", 20.0, 40.0, 55.0, 65.0, -3.0),
            row("SOL", 5.0, 80.0, 20.0, 90.0, 30.0),
            row("XRP", -10.0, 10.0, 10.0, 10.0, 0.0),
        ];
        let (_out, metrics) = orthogonalize_batch(&rows, &OrthogonalizerConfig::default()).unwrap();
        assert!((metrics.momentum_preservation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn s6_social_cap_applies_to_residualized_value() {
        // BTC/ETH/SOL carry varied momentum/technical/volume/quality signal;
        // XRP carries only social. XRP is orthogonal (by zero, not just low
        // correlation) to every other factor vector, so social's residual
        // equals its raw value exactly, isolating the hard cap as the only
        // transform applied to it.
        let mut rows = vec![
            row("BTC", 10.0, 50.0, 20.0, 70.0, 0.0),
            row("ETH", 5.0, 10.0, 60.0, 30.0, 0.0),
            row("SOL", -3.0, 40.0, 15.0, 55.0, 0.0),
            row("XRP", 0.0, 0.0, 0.0, 0.0, 13.0),
        ];
        let (out, _) = orthogonalize_batch(&rows, &OrthogonalizerConfig::default()).unwrap();
        assert_eq!(out[3].social_capped, 10.0);

        rows[3] = row("XRP", 0.0, 0.0, 0.0, 0.0, 7.5);
        let (out2, _) = orthogonalize_batch(&rows, &OrthogonalizerConfig::default()).unwrap();
        assert_eq!(out2[3].social_capped, 7.5);
    }

    #[test]
    fn empty_batch_rejected() {
        assert!(matches!(
            orthogonalize_batch(&[], &OrthogonalizerConfig::default()),
            Err(OrthogonalizerError::EmptyBatch)
        ));
    }

    #[test]
    fn residualization_order_excludes_momentum() {
        assert!(!RESIDUALIZATION_ORDER.contains(&"momentumCore"));
    }
}
