//! Factor Builder (C7).
//!
//! Produces a `RawFactorRow` per symbol from facade outputs: multi-timeframe
//! momentum core (ATR-normalized, acceleration-boosted), technical,
//! volume, quality (microstructure + market-cap tier) and an uncapped
//! social score.

use crate::domain::{OrderBookSnapshot, RawFactorRow, Symbol};
use crate::regime::WeightBlend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Momentum-core scaling curve (spec.md §9 Open Question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentumScale {
    /// `50 * (1 + tanh(x/2))`, clamped to [0,100].
    Tanh,
    /// Direct weighted-sum, clamped to [0,100].
    DirectCap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorConfig {
    pub momentum_scale: MomentumScale,
    pub atr_normalization_enabled: bool,
    pub accel_boost: f64,
    pub volume_surge_ratio: f64,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            momentum_scale: MomentumScale::Tanh,
            atr_normalization_enabled: true,
            accel_boost: 0.5,
            volume_surge_ratio: 1.75,
        }
    }
}

/// Multi-timeframe returns and ATR inputs for the momentum core.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumInputs {
    pub r1h: f64,
    pub r4h: f64,
    pub r12h: f64,
    pub r24h: f64,
    pub r7d: f64,
    pub atr_1h: f64,
    pub atr_4h: f64,
    /// `Some` only when Δr_4h is derivable from the last two bars.
    pub delta_r4h: Option<f64>,
}

/// `core = Σ w_tf * (r_tf / ATR_tf_reference) + accelBoost * |Δr_4h|`
/// (spec.md §4.7). Returned in score-equivalent units in `[-1000,1000]`
/// (pre-scale); `momentum_core_score` below maps it to `[0,100]`.
pub fn momentum_core_raw(inputs: &MomentumInputs, blend: &WeightBlend, config: &FactorConfig) -> f64 {
    let atr_ref = |tf_is_1h: bool| -> f64 {
        if !config.atr_normalization_enabled {
            return 1.0;
        }
        if tf_is_1h {
            inputs.atr_1h.max(1e-9)
        } else {
            inputs.atr_4h.max(1e-9)
        }
    };

    let mut core = blend.w1h * (inputs.r1h / atr_ref(true))
        + blend.w4h * (inputs.r4h / atr_ref(false))
        + blend.w12h * (inputs.r12h / atr_ref(false))
        + blend.w24h * (inputs.r24h / atr_ref(false))
        + blend.w7d * (inputs.r7d / atr_ref(false));

    // Acceleration term applies only when fresh and sign-aligned with r4h.
    if let Some(delta) = inputs.delta_r4h {
        let sign_aligned = delta.signum() == inputs.r4h.signum() || inputs.r4h == 0.0;
        if sign_aligned {
            core += config.accel_boost * delta.abs();
        }
    }

    core.clamp(-1000.0, 1000.0)
}

/// Maps the raw aggregate to `[0,100]` using the configured bounded
/// transform.
pub fn momentum_core_score(raw: f64, config: &FactorConfig) -> f64 {
    match config.momentum_scale {
        MomentumScale::Tanh => (50.0 * (1.0 + (raw / 2.0).tanh())).clamp(0.0, 100.0),
        MomentumScale::DirectCap => (raw + 50.0).clamp(0.0, 100.0),
    }
}

/// Technical score combining RSI(14), ADX, Hurst persistence, and ATR
/// ratio into a bounded `[0,100]` score (simple weighted blend; each input
/// is expected pre-normalized to `[0,100]`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalInputs {
    pub rsi14: f64,
    pub adx: f64,
    pub hurst: f64,
    pub atr_ratio: f64,
}

pub fn technical_score(inputs: &TechnicalInputs) -> f64 {
    let weighted = 0.30 * inputs.rsi14 + 0.25 * inputs.adx + 0.25 * inputs.hurst + 0.20 * inputs.atr_ratio;
    weighted.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeInputs {
    pub v24h: f64,
    pub avg_v: f64,
    pub vwap_score: f64,
    pub obv_score: f64,
}

/// `volumeRatio = v24h / avg(v)`; surge flag when `ratio >= threshold`.
pub fn volume_ratio(inputs: &VolumeInputs) -> f64 {
    if inputs.avg_v <= 0.0 {
        return 0.0;
    }
    inputs.v24h / inputs.avg_v
}

pub fn volume_surge(inputs: &VolumeInputs, config: &FactorConfig) -> bool {
    volume_ratio(inputs) >= config.volume_surge_ratio
}

pub fn volume_score(inputs: &VolumeInputs, config: &FactorConfig) -> f64 {
    let ratio = volume_ratio(inputs);
    let ratio_score = (ratio / config.volume_surge_ratio * 50.0).clamp(0.0, 100.0);
    (0.5 * ratio_score + 0.3 * inputs.vwap_score + 0.2 * inputs.obv_score).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy)]
pub enum MarketCapTier {
    Large,
    Mid,
    Small,
}

impl MarketCapTier {
    pub fn tier_score(&self) -> f64 {
        match self {
            MarketCapTier::Large => 100.0,
            MarketCapTier::Mid => 60.0,
            MarketCapTier::Small => 30.0,
        }
    }
}

/// VADR multiple: a volume-adjusted-depth ratio; higher = more liquid
/// relative to recent activity (glossary). Callers compute this from a
/// rolling window of (depth, volume) observations.
pub fn vadr(recent_depth: f64, recent_volume_rate: f64) -> f64 {
    if recent_volume_rate <= 0.0 {
        return 0.0;
    }
    recent_depth / recent_volume_rate
}

/// Quality combines native L1/L2 microstructure (spread bps, depth within
/// +-2% of mid, VADR multiple) and market-cap tier. Only venue-native
/// books may be passed here — enforcing that is the caller's
/// responsibility via `facade::venue::require_native`.
pub fn quality_score(book: &OrderBookSnapshot, vadr_multiple: f64, tier: MarketCapTier) -> f64 {
    let spread_component = book
        .spread_bps()
        .map(|bps| (100.0 - bps).clamp(0.0, 100.0))
        .unwrap_or(0.0);
    let depth_component = book
        .depth_within_pct(0.02)
        .map(|d| (d / 1000.0).clamp(0.0, 100.0))
        .unwrap_or(0.0);
    let vadr_component = (vadr_multiple * 20.0).clamp(0.0, 100.0);

    (0.35 * spread_component + 0.35 * depth_component + 0.20 * vadr_component + 0.10 * tier.tier_score())
        .clamp(0.0, 100.0)
}

/// Social raw score, passed uncapped to the orthogonalizer (capping
/// happens post-residualization, spec.md §4.7-4.8).
pub fn social_raw(mentions_z: f64, sentiment_score: f64, confidence: f64) -> f64 {
    (mentions_z * 5.0 + sentiment_score) * confidence.clamp(0.0, 1.0)
}

/// Assembles a full `RawFactorRow` for one symbol.
pub struct FactorBuilderInputs<'a> {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub momentum: MomentumInputs,
    pub technical: TechnicalInputs,
    pub volume: VolumeInputs,
    pub book: &'a OrderBookSnapshot,
    pub vadr_multiple: f64,
    pub tier: MarketCapTier,
    pub social_mentions_z: f64,
    pub social_sentiment: f64,
    pub social_confidence: f64,
}

pub fn build_row(
    inputs: FactorBuilderInputs<'_>,
    blend: &WeightBlend,
    config: &FactorConfig,
) -> RawFactorRow {
    let raw_core = momentum_core_raw(&inputs.momentum, blend, config);
    let momentum_core = momentum_core_score(raw_core, config);
    let technical = technical_score(&inputs.technical);
    let volume = volume_score(&inputs.volume, config);
    let quality = quality_score(inputs.book, inputs.vadr_multiple, inputs.tier);
    let social = social_raw(inputs.social_mentions_z, inputs.social_sentiment, inputs.social_confidence);

    let mut details = HashMap::new();
    details.insert("raw_momentum_aggregate".to_string(), raw_core);
    details.insert("volume_ratio".to_string(), volume_ratio(&inputs.volume));
    details.insert("vadr_multiple".to_string(), inputs.vadr_multiple);

    RawFactorRow {
        symbol: inputs.symbol,
        timestamp: inputs.timestamp,
        momentum_core,
        technical,
        volume,
        quality,
        social,
        factor_details: details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Level, ProviderKind};

    fn blend() -> WeightBlend {
        WeightBlend { w1h: 0.2, w4h: 0.2, w12h: 0.2, w24h: 0.2, w7d: 0.2 }
    }

    #[test]
    fn acceleration_term_applies_only_when_sign_aligned() {
        let config = FactorConfig::default();
        let mut inputs = MomentumInputs {
            r1h: 1.0, r4h: 2.0, r12h: 1.0, r24h: 1.0, r7d: 1.0,
            atr_1h: 1.0, atr_4h: 1.0, delta_r4h: Some(0.5),
        };
        let with_accel = momentum_core_raw(&inputs, &blend(), &config);
        inputs.delta_r4h = Some(-0.5); // opposite sign of r4h -> no boost
        let without_accel = momentum_core_raw(&inputs, &blend(), &config);
        assert!(with_accel > without_accel);
    }

    #[test]
    fn momentum_score_is_bounded() {
        let config = FactorConfig::default();
        assert!((0.0..=100.0).contains(&momentum_core_score(1000.0, &config)));
        assert!((0.0..=100.0).contains(&momentum_core_score(-1000.0, &config)));
    }

    #[test]
    fn volume_surge_flag_respects_threshold() {
        let config = FactorConfig::default();
        let inputs = VolumeInputs { v24h: 175.0, avg_v: 100.0, vwap_score: 50.0, obv_score: 50.0 };
        assert!(volume_surge(&inputs, &config));
        let inputs2 = VolumeInputs { v24h: 150.0, avg_v: 100.0, vwap_score: 50.0, obv_score: 50.0 };
        assert!(!volume_surge(&inputs2, &config));
    }

    #[test]
    fn quality_score_uses_native_book_fields() {
        let book = OrderBookSnapshot {
            venue: "binance".into(),
            provider: ProviderKind::VenueNative,
            symbol: Symbol::new("BTC", "USD"),
            timestamp: Utc::now(),
            bids: vec![Level { price: 100.0, quantity: 10.0 }],
            asks: vec![Level { price: 100.1, quantity: 10.0 }],
            last_update_id: 1,
            is_l2: true,
        };
        let score = quality_score(&book, 2.0, MarketCapTier::Large);
        assert!((0.0..=100.0).contains(&score));
    }
}
