//! Composite Scorer (C9).
//!
//! `finalScore = w_m*momentumCore + w_t*tech_r + w_v*vol_r + w_q*qual_r +
//! socialCapped`, with `(w_m,w_t,w_v,w_q)` summing to 1.0 and social added
//! outside the allocation (spec.md §4.9).

use crate::domain::{OrthogonalizedRow, WeightedContribution};
use crate::regime::Regime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub momentum: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.momentum + self.technical + self.volume + self.quality
    }
}

/// Per-regime `(w_m, w_t, w_v, w_q)` profile table (spec.md §4.9: "come
/// from the current regime's profile"), the scorer-allocation counterpart
/// to `regime::WeightBlends`'s multi-timeframe momentum blend — the two
/// are distinct concepts kept separate on purpose (§4.6 vs §4.9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeightProfiles {
    pub trending_bull: ScoreWeights,
    pub choppy: ScoreWeights,
    pub high_vol: ScoreWeights,
}

impl Default for ScoreWeightProfiles {
    fn default() -> Self {
        Self {
            // Momentum dominates a confirmed trend.
            trending_bull: ScoreWeights { momentum: 0.50, technical: 0.20, volume: 0.15, quality: 0.15 },
            // No reliable trend to lean on; weight spread evenly across
            // the residualized factors.
            choppy: ScoreWeights { momentum: 0.35, technical: 0.25, volume: 0.20, quality: 0.20 },
            // Volume/participation matters more than directional momentum
            // when volatility itself is the dominant regime signal.
            high_vol: ScoreWeights { momentum: 0.30, technical: 0.20, volume: 0.30, quality: 0.20 },
        }
    }
}

impl ScoreWeightProfiles {
    pub fn for_regime(&self, regime: Regime) -> ScoreWeights {
        match regime {
            Regime::TrendingBull => self.trending_bull,
            Regime::Choppy => self.choppy,
            Regime::HighVol => self.high_vol,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("weight sum {0:.4} outside tolerance of 1.0")]
    WeightSumOutOfTolerance(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidateRow {
    pub final_score: f64,
    pub weighted_contributions: Vec<WeightedContribution>,
}

/// Applies `weights` to `row`, checking the weight-sum tolerance
/// (Testable Property 3) before scoring.
pub fn score_row(
    row: &OrthogonalizedRow,
    weights: &ScoreWeights,
    weight_sum_tolerance: f64,
) -> Result<ScoredCandidateRow, ScorerError> {
    if (weights.sum() - 1.0).abs() > weight_sum_tolerance {
        return Err(ScorerError::WeightSumOutOfTolerance(weights.sum()));
    }

    let contributions = vec![
        WeightedContribution {
            factor: "momentumCore".to_string(),
            weight: weights.momentum,
            value: row.momentum_core,
            contribution: weights.momentum * row.momentum_core,
        },
        WeightedContribution {
            factor: "technicalResidual".to_string(),
            weight: weights.technical,
            value: row.technical_residual,
            contribution: weights.technical * row.technical_residual,
        },
        WeightedContribution {
            factor: "volumeResidual".to_string(),
            weight: weights.volume,
            value: row.volume_residual,
            contribution: weights.volume * row.volume_residual,
        },
        WeightedContribution {
            factor: "qualityResidual".to_string(),
            weight: weights.quality,
            value: row.quality_residual,
            contribution: weights.quality * row.quality_residual,
        },
        WeightedContribution {
            factor: "socialCapped".to_string(),
            weight: 1.0,
            value: row.social_capped,
            contribution: row.social_capped,
        },
    ];

    let final_score = contributions.iter().map(|c| c.contribution).sum();

    Ok(ScoredCandidateRow {
        final_score,
        weighted_contributions: contributions,
    })
}
