//! Gates & Guards Engine (C10).
//!
//! Deterministic two-stage admission filter: entry gates (score, VADR,
//! funding divergence) combined with guards (freshness, fatigue,
//! late-fill, liquidity, social cap, catalyst heat), plus a fixed-
//! precedence exit hierarchy. Every check emits a structured
//! `GateResult{pass, value, threshold, reason, fixHint}` — attribution is
//! a first-class output, not a log string (spec.md §9 Design Notes),
//! grounded on `risk.rs::RiskManager`'s guardrail-flag accumulation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub name: &'static str,
    pub pass: bool,
    pub value: f64,
    pub threshold: f64,
    pub reason: String,
    pub fix_hint: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateThresholds {
    pub score_min: f64,
    pub vadr_min_samples: usize,
    pub funding_z_threshold: f64,
    pub funding_window_bars: usize,
    pub bar_age_max: f64,
    pub atr_multiple: f64,
    pub late_fill_seconds: f64,
    pub max_hold_hours: f64,
    pub fatigue_r24h_pct: f64,
    pub fatigue_rsi4h: f64,
    pub catalyst_heat_cap: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            score_min: 75.0,
            vadr_min_samples: 20,
            funding_z_threshold: -1.5,
            funding_window_bars: 180, // 30 days of 4h bars
            bar_age_max: 2.0,
            atr_multiple: 1.2,
            late_fill_seconds: 30.0,
            max_hold_hours: 48.0,
            fatigue_r24h_pct: 12.0,
            fatigue_rsi4h: 70.0,
            catalyst_heat_cap: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub vadr_floor: f64,
    pub spread_bps_cap: f64,
    pub depth_usd_floor: f64,
}

// ---------------------------------------------------------------------
// Entry gates
// ---------------------------------------------------------------------

pub struct ScoreGateInput {
    pub final_score: f64,
}

pub fn score_gate(input: &ScoreGateInput, t: &GateThresholds) -> GateResult {
    let pass = input.final_score >= t.score_min;
    GateResult {
        name: "score",
        pass,
        value: input.final_score,
        threshold: t.score_min,
        reason: if pass {
            "score meets threshold".to_string()
        } else {
            format!("score {:.1} < {:.1} threshold", input.final_score, t.score_min)
        },
        fix_hint: "wait for a higher-conviction setup or a regime shift that raises the score".to_string(),
    }
}

pub struct VadrGateInput {
    pub vadr: f64,
    pub vadr_p80: f64,
    pub sample_count: usize,
}

/// Fail-closed: fewer than `vadr_min_samples` observations freezes the gate.
pub fn vadr_gate(input: &VadrGateInput, tier: &TierLimits, t: &GateThresholds) -> GateResult {
    if input.sample_count < t.vadr_min_samples {
        return GateResult {
            name: "vadr",
            pass: false,
            value: input.vadr,
            threshold: input.vadr_p80.max(tier.vadr_floor),
            reason: format!(
                "rolling VADR window has {} samples < {} minimum; gate frozen (fail-closed)",
                input.sample_count, t.vadr_min_samples
            ),
            fix_hint: "accumulate more VADR samples before admitting this symbol".to_string(),
        };
    }
    let threshold = input.vadr_p80.max(tier.vadr_floor);
    let pass = input.vadr >= threshold;
    GateResult {
        name: "vadr",
        pass,
        value: input.vadr,
        threshold,
        reason: if pass {
            "VADR meets threshold".to_string()
        } else {
            format!("VADR {:.2} < {:.2} (max of p80/tier floor)", input.vadr, threshold)
        },
        fix_hint: "wait for liquidity/depth to improve relative to recent activity".to_string(),
    }
}

pub struct FundingGateInput {
    pub venue_median_funding_z: f64,
    pub spot_vwap_holds: bool,
    pub spot_cvd: f64,
    pub perp_cvd: f64,
    /// Worst (largest) staleness multiplier across the feeds this gate
    /// reads from; >1.0 means some feed is stale and the gate aborts.
    pub worst_feed_staleness_multiplier: f64,
}

pub fn funding_divergence_gate(input: &FundingGateInput, t: &GateThresholds) -> GateResult {
    if input.worst_feed_staleness_multiplier > 1.0 {
        return GateResult {
            name: "funding_divergence",
            pass: false,
            value: input.venue_median_funding_z,
            threshold: t.funding_z_threshold,
            reason: format!(
                "worst-feed staleness multiplier {:.2} > 1.0; gate aborted",
                input.worst_feed_staleness_multiplier
            ),
            fix_hint: "wait for all contributing feeds to refresh before re-evaluating".to_string(),
        };
    }

    let z_pass = input.venue_median_funding_z < t.funding_z_threshold;
    let cvd_pass = input.spot_cvd >= 0.0 || input.perp_cvd <= 0.0;
    let pass = z_pass && input.spot_vwap_holds && cvd_pass;

    let reason = if pass {
        "funding divergence confirmed".to_string()
    } else {
        let mut reasons = Vec::new();
        if !z_pass {
            reasons.push(format!(
                "funding z-score {:.2} not < {:.2} threshold",
                input.venue_median_funding_z, t.funding_z_threshold
            ));
        }
        if !input.spot_vwap_holds {
            reasons.push("spot VWAP(24h) does not hold".to_string());
        }
        if !cvd_pass {
            reasons.push("spot CVD < 0 and perp CVD > 0".to_string());
        }
        reasons.join(" AND ")
    };

    GateResult {
        name: "funding_divergence",
        pass,
        value: input.venue_median_funding_z,
        threshold: t.funding_z_threshold,
        reason,
        fix_hint: "wait for funding to diverge further negative with confirming spot/perp flow".to_string(),
    }
}

// ---------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------

pub struct FreshnessGuardInput {
    pub bar_age: f64,
    pub last_price_move_abs: f64,
    pub atr_1h: f64,
}

pub fn freshness_guard(input: &FreshnessGuardInput, t: &GateThresholds) -> GateResult {
    if input.bar_age > t.bar_age_max {
        return GateResult {
            name: "freshness",
            pass: false,
            value: input.bar_age,
            threshold: t.bar_age_max,
            reason: format!("age {:.0} > {:.0}", input.bar_age, t.bar_age_max),
            fix_hint: "wait for a fresher bar before entry".to_string(),
        };
    }
    let move_cap = t.atr_multiple * input.atr_1h;
    let pass = input.last_price_move_abs <= move_cap;
    GateResult {
        name: "freshness",
        pass,
        value: input.last_price_move_abs,
        threshold: move_cap,
        reason: if pass {
            "freshness within bounds".to_string()
        } else {
            format!(
                "{:.2}\u{00d7}ATR > {:.2}\u{00d7}ATR",
                input.last_price_move_abs / input.atr_1h.max(1e-9),
                t.atr_multiple
            )
        },
        fix_hint: "wait for price to settle closer to the recent ATR band".to_string(),
    }
}

pub struct FatigueGuardInput {
    pub r24h_pct: f64,
    pub rsi4h: f64,
    pub delta_r4h: f64,
    pub accel_renewal: bool,
}

/// `r24h > +12% AND RSI4h > 70` blocks unless acceleration is renewing
/// (`Δr4h > 0` when `accelRenewal=true`).
pub fn fatigue_guard(input: &FatigueGuardInput, t: &GateThresholds) -> GateResult {
    let fatigued = input.r24h_pct > t.fatigue_r24h_pct && input.rsi4h > t.fatigue_rsi4h;
    if !fatigued {
        return GateResult {
            name: "fatigue",
            pass: true,
            value: input.r24h_pct,
            threshold: t.fatigue_r24h_pct,
            reason: "not fatigued".to_string(),
            fix_hint: String::new(),
        };
    }

    let renewing = input.accel_renewal && input.delta_r4h > 0.0;
    if renewing {
        return GateResult {
            name: "fatigue",
            pass: true,
            value: input.r24h_pct,
            threshold: t.fatigue_r24h_pct,
            reason: "acceleration renewal override".to_string(),
            fix_hint: String::new(),
        };
    }

    GateResult {
        name: "fatigue",
        pass: false,
        value: input.r24h_pct,
        threshold: t.fatigue_r24h_pct,
        reason: format!(
            "24h return {:.1}% > {:.1}% threshold AND RSI4h {:.1} > {} AND no acceleration renewal",
            input.r24h_pct, t.fatigue_r24h_pct, input.rsi4h, t.fatigue_rsi4h as i64
        ),
        fix_hint: "wait for RSI to cool or for a renewed acceleration signal".to_string(),
    }
}

pub struct LateFillGuardInput {
    pub seconds_since_signal_bar_close: f64,
}

pub fn late_fill_guard(input: &LateFillGuardInput, t: &GateThresholds) -> GateResult {
    let pass = input.seconds_since_signal_bar_close < t.late_fill_seconds;
    GateResult {
        name: "late_fill",
        pass,
        value: input.seconds_since_signal_bar_close,
        threshold: t.late_fill_seconds,
        reason: if pass {
            "execution within late-fill window".to_string()
        } else {
            format!(
                "{:.1}s since signal bar close >= {:.0}s threshold",
                input.seconds_since_signal_bar_close, t.late_fill_seconds
            )
        },
        fix_hint: "re-evaluate on the next signal bar; this fill is too late".to_string(),
    }
}

pub struct LiquidityGuardInput {
    pub spread_bps_60s_avg: f64,
    pub depth_usd_pct2: f64,
    pub is_venue_native: bool,
}

pub fn liquidity_guard(input: &LiquidityGuardInput, tier: &TierLimits) -> GateResult {
    if !input.is_venue_native {
        return GateResult {
            name: "liquidity",
            pass: false,
            value: f64::NAN,
            threshold: tier.spread_bps_cap,
            reason: "AGGREGATOR_BAN: microstructure path requires venue-native L1/L2".to_string(),
            fix_hint: "route the order book request to a venue-native provider".to_string(),
        };
    }
    let spread_ok = input.spread_bps_60s_avg <= tier.spread_bps_cap;
    let depth_ok = input.depth_usd_pct2 >= tier.depth_usd_floor;
    let pass = spread_ok && depth_ok;
    GateResult {
        name: "liquidity",
        pass,
        value: input.spread_bps_60s_avg,
        threshold: tier.spread_bps_cap,
        reason: if pass {
            "liquidity within tier bounds".to_string()
        } else if !spread_ok {
            format!("spread {:.1}bps > {:.1}bps tier cap", input.spread_bps_60s_avg, tier.spread_bps_cap)
        } else {
            format!("depth ${:.0} < ${:.0} tier floor", input.depth_usd_pct2, tier.depth_usd_floor)
        },
        fix_hint: "wait for spread to tighten or depth to rebuild".to_string(),
    }
}

/// Always satisfied by construction — the orthogonalizer hard-caps social
/// before the scorer ever sees it (spec.md §4.8).
pub fn social_cap_guard(social_capped: f64, hard_cap: f64) -> GateResult {
    let pass = social_capped.abs() <= hard_cap;
    GateResult {
        name: "social_cap",
        pass,
        value: social_capped,
        threshold: hard_cap,
        reason: "social contribution capped upstream".to_string(),
        fix_hint: String::new(),
    }
}

pub fn catalyst_heat_guard(catalyst_heat: f64, t: &GateThresholds) -> GateResult {
    let pass = catalyst_heat <= t.catalyst_heat_cap;
    GateResult {
        name: "catalyst_heat",
        pass,
        value: catalyst_heat,
        threshold: t.catalyst_heat_cap,
        reason: if pass {
            "catalyst heat within cap".to_string()
        } else {
            format!("catalyst heat {:.1} > {:.1} cap", catalyst_heat, t.catalyst_heat_cap)
        },
        fix_hint: "wait for event proximity to decay".to_string(),
    }
}

/// Runs all gates/guards and returns them in stable (alphabetical by gate
/// name) order, as spec.md §4.10 requires for serialization.
pub fn evaluate_all(results: Vec<GateResult>) -> Vec<GateResult> {
    let mut out = results;
    out.sort_by(|a, b| a.name.cmp(b.name));
    out
}

// ---------------------------------------------------------------------
// Exit precedence
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitType {
    HardStop,
    VenueHealthDegraded,
    MaxHold,
    ProfitTarget,
    AccelerationReversal,
    MomentumFade,
    TrailingStop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExitConditions {
    pub hard_stop: bool,
    pub venue_health_degraded: bool,
    pub max_hold: bool,
    pub profit_target: bool,
    pub acceleration_reversal: bool,
    pub momentum_fade: bool,
    pub trailing_stop: bool,
}

/// Strict first-match-fires precedence (spec.md §4.10, Testable Property
/// 10): hard-stop -> venue-health degraded -> max-hold -> profit target ->
/// acceleration reversal -> momentum fade -> trailing stop.
pub fn resolve_exit(conditions: &ExitConditions) -> Option<ExitType> {
    if conditions.hard_stop {
        return Some(ExitType::HardStop);
    }
    if conditions.venue_health_degraded {
        return Some(ExitType::VenueHealthDegraded);
    }
    if conditions.max_hold {
        return Some(ExitType::MaxHold);
    }
    if conditions.profit_target {
        return Some(ExitType::ProfitTarget);
    }
    if conditions.acceleration_reversal {
        return Some(ExitType::AccelerationReversal);
    }
    if conditions.momentum_fade {
        return Some(ExitType::MomentumFade);
    }
    if conditions.trailing_stop {
        return Some(ExitType::TrailingStop);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_fatigue_blocks() {
        let input = FatigueGuardInput { r24h_pct: 15.0, rsi4h: 72.0, delta_r4h: 0.0, accel_renewal: true };
        let r = fatigue_guard(&input, &GateThresholds::default());
        assert!(!r.pass);
        assert_eq!(
            r.reason,
            "24h return 15.0% > 12.0% threshold AND RSI4h 72.0 > 70 AND no acceleration renewal"
        );
    }

    #[test]
    fn s2_fatigue_override_by_acceleration() {
        let input = FatigueGuardInput { r24h_pct: 18.0, rsi4h: 75.0, delta_r4h: 0.8, accel_renewal: true };
        let r = fatigue_guard(&input, &GateThresholds::default());
        assert!(r.pass);
        assert_eq!(r.reason, "acceleration renewal override");
    }

    #[test]
    fn s3_freshness_stale() {
        let input = FreshnessGuardInput { bar_age: 3.0, last_price_move_abs: 80.0, atr_1h: 100.0 };
        let r = freshness_guard(&input, &GateThresholds::default());
        assert!(!r.pass);
        assert_eq!(r.reason, "age 3 > 2");
    }

    #[test]
    fn s4_freshness_atr_breach() {
        let input = FreshnessGuardInput { bar_age: 1.0, last_price_move_abs: 250.0, atr_1h: 200.0 };
        let r = freshness_guard(&input, &GateThresholds::default());
        assert!(!r.pass);
        assert_eq!(r.reason, "1.25\u{00d7}ATR > 1.20\u{00d7}ATR");
    }

    #[test]
    fn s8_deterministic_exit_precedence() {
        let conditions = ExitConditions {
            hard_stop: true,
            profit_target: true,
            trailing_stop: true,
            ..Default::default()
        };
        assert_eq!(resolve_exit(&conditions), Some(ExitType::HardStop));
    }

    #[test]
    fn exit_precedence_falls_through_in_order() {
        let conditions = ExitConditions { profit_target: true, trailing_stop: true, ..Default::default() };
        assert_eq!(resolve_exit(&conditions), Some(ExitType::ProfitTarget));
        assert_eq!(resolve_exit(&ExitConditions::default()), None);
    }

    #[test]
    fn vadr_gate_fails_closed_on_insufficient_samples() {
        let input = VadrGateInput { vadr: 10.0, vadr_p80: 2.0, sample_count: 5 };
        let tier = TierLimits { vadr_floor: 1.0, spread_bps_cap: 50.0, depth_usd_floor: 10_000.0 };
        let r = vadr_gate(&input, &tier, &GateThresholds::default());
        assert!(!r.pass);
        assert!(r.reason.contains("fail-closed"));
    }

    #[test]
    fn liquidity_guard_rejects_aggregator_source() {
        let input = LiquidityGuardInput { spread_bps_60s_avg: 5.0, depth_usd_pct2: 50_000.0, is_venue_native: false };
        let tier = TierLimits { vadr_floor: 1.0, spread_bps_cap: 50.0, depth_usd_floor: 10_000.0 };
        let r = liquidity_guard(&input, &tier);
        assert!(!r.pass);
        assert!(r.reason.contains("AGGREGATOR_BAN"));
    }

    #[test]
    fn gate_results_serialize_in_alphabetical_order() {
        let a = GateResult { name: "vadr".into(), pass: true, value: 0.0, threshold: 0.0, reason: String::new(), fix_hint: String::new() };
        let b = GateResult { name: "freshness".into(), pass: true, value: 0.0, threshold: 0.0, reason: String::new(), fix_hint: String::new() };
        let sorted = evaluate_all(vec![a, b]);
        assert_eq!(sorted[0].name, "freshness");
        assert_eq!(sorted[1].name, "vadr");
    }
}
