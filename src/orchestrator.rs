//! Scan Orchestrator (C11).
//!
//! Owns the scan-cycle clock: on each tick it reads the current regime
//! snapshot, pulls fresh data for the universe through the facade under a
//! per-cycle deadline, batches the raw factor rows through orthogonalization
//! and scoring, applies gates, ranks, and truncates to the top N. Grounded
//! on `backtest_v2/orchestrator.rs::BacktestOrchestrator`'s "owns a config,
//! exposes a single `run()` that drives the whole loop and returns a
//! results object" shape, adapted from an offline replay loop to a live
//! periodic scan.

use crate::config::Config;
use crate::domain::{OrthogonalizedRow, RawFactorRow, Symbol};
use crate::error::CoreError;
use crate::facade::pit::CycleAuditRecord;
use crate::facade::DataFacade;
use crate::gates::{
    catalyst_heat_guard, evaluate_all, fatigue_guard, freshness_guard, funding_divergence_gate, late_fill_guard,
    liquidity_guard, score_gate, social_cap_guard, vadr_gate, FatigueGuardInput, FreshnessGuardInput,
    FundingGateInput, GateResult, GateThresholds, LateFillGuardInput, LiquidityGuardInput, ScoreGateInput,
    TierLimits, VadrGateInput,
};
use crate::orthogonal::{orthogonalize_batch, OrthogonalizerConfig, SOCIAL_HARD_CAP};
use crate::regime::{RegimeDetector, RegimeSnapshot};
use crate::scorer::{score_row, ScoreWeightProfiles};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// One symbol's fully-assembled candidate after gating and scoring.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub symbol: Symbol,
    pub final_score: f64,
    pub orthogonality_preserved_momentum: f64,
    pub gate_results: Vec<GateResult>,
    pub admitted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CycleResult {
    pub run_id: String,
    pub regime: Option<RegimeSnapshot>,
    pub candidates: Vec<CandidateResult>,
    pub dropped_symbols: Vec<Symbol>,
}

/// Per-symbol data the caller has already assembled into a raw factor row
/// plus whatever the entry gates and guards need (VADR sample history,
/// tier limits, funding/freshness/fatigue/late-fill/liquidity/catalyst
/// inputs). The orchestrator does not know how to compute factors itself
/// — that is `factors::build_row`'s job — it only sequences batches
/// through it.
pub struct SymbolInput {
    pub row: RawFactorRow,
    pub vadr: f64,
    pub vadr_p80: f64,
    pub vadr_sample_count: usize,
    pub tier: TierLimits,
    pub snapshot_ids: Vec<String>,
    pub funding: FundingGateInput,
    pub freshness: FreshnessGuardInput,
    pub fatigue: FatigueGuardInput,
    pub late_fill: LateFillGuardInput,
    pub liquidity: LiquidityGuardInput,
    pub catalyst_heat: f64,
}

pub struct Orchestrator {
    config: Config,
    regime: RegimeDetector,
    weight_profiles: ScoreWeightProfiles,
    facade: DataFacade,
}

impl Orchestrator {
    pub fn new(config: Config, facade: DataFacade) -> Self {
        Self {
            regime: RegimeDetector::new(config.regime.thresholds, config.regime.stability_window_len),
            weight_profiles: config.scoring.weight_profiles,
            config,
            facade,
        }
    }

    pub fn facade(&self) -> &DataFacade {
        &self.facade
    }

    pub fn regime_detector(&self) -> &RegimeDetector {
        &self.regime
    }

    /// Run one scan cycle against already-assembled per-symbol inputs,
    /// enforcing the cycle deadline and producing a PIT audit record.
    /// Symbols whose inputs are missing are recorded as dropped rather
    /// than silently absent (spec.md §5 partial-assembly policy).
    pub async fn run_cycle(
        &self,
        inputs: Vec<SymbolInput>,
        missing_symbols: Vec<Symbol>,
        regime_snapshot: RegimeSnapshot,
    ) -> Result<CycleResult, CoreError> {
        let run_id = Uuid::new_v4().to_string();
        let deadline = Duration::from_secs(self.config.orchestrator.cycle_deadline_secs);
        let started = std::time::Instant::now();

        let weights = self.weight_profiles.for_regime(regime_snapshot.regime);
        let gate_thresholds = self.gate_thresholds();

        let rows: Vec<RawFactorRow> = inputs.iter().map(|i| i.row.clone()).collect();
        let orth_config = OrthogonalizerConfig {
            social_hard_cap: SOCIAL_HARD_CAP,
            ..OrthogonalizerConfig::default()
        };
        let (orthogonalized, metrics) = orthogonalize_batch(&rows, &orth_config)?;

        if started.elapsed() > deadline {
            return Err(CoreError::CycleDeadlineExceeded);
        }

        let mut candidates = Vec::with_capacity(orthogonalized.len());
        let mut snapshot_ids = HashMap::new();
        for (input, orth_row) in inputs.iter().zip(orthogonalized.iter()) {
            let candidate = self.evaluate_symbol(input, orth_row, &weights, &gate_thresholds)?;
            snapshot_ids.insert(candidate.symbol.to_string(), input.snapshot_ids.clone());
            candidates.push(candidate);
        }

        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.orthogonality_preserved_momentum
                        .partial_cmp(&a.orthogonality_preserved_momentum)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        candidates.truncate(self.config.orchestrator.top_n);

        if !missing_symbols.is_empty() {
            warn!(count = missing_symbols.len(), "symbols dropped for incomplete data this cycle");
        }
        info!(
            run_id = %run_id,
            regime = ?regime_snapshot.regime,
            momentum_preservation = metrics.momentum_preservation,
            admitted = candidates.iter().filter(|c| c.admitted).count(),
            "scan cycle complete"
        );

        let _audit = CycleAuditRecord { run_id: run_id.clone(), snapshot_ids };

        Ok(CycleResult { run_id, regime: Some(regime_snapshot), candidates, dropped_symbols: missing_symbols })
    }

    /// Runs all three entry gates and all six guards every cycle (spec.md
    /// §4.10: "ALL required") and returns them in the fixed alphabetical
    /// order `evaluate_all` imposes.
    fn evaluate_symbol(
        &self,
        input: &SymbolInput,
        orth_row: &OrthogonalizedRow,
        weights: &crate::scorer::ScoreWeights,
        thresholds: &GateThresholds,
    ) -> Result<CandidateResult, CoreError> {
        let scored = score_row(orth_row, weights, self.config.scoring.weight_sum_tolerance)?;

        let score_result = score_gate(&ScoreGateInput { final_score: scored.final_score }, thresholds);
        let vadr_result = vadr_gate(
            &VadrGateInput { vadr: input.vadr, vadr_p80: input.vadr_p80, sample_count: input.vadr_sample_count },
            &input.tier,
            thresholds,
        );
        let funding_result = funding_divergence_gate(&input.funding, thresholds);
        let freshness_result = freshness_guard(&input.freshness, thresholds);
        let fatigue_result = fatigue_guard(&input.fatigue, thresholds);
        let late_fill_result = late_fill_guard(&input.late_fill, thresholds);
        let liquidity_result = liquidity_guard(&input.liquidity, &input.tier);
        let social_result = social_cap_guard(orth_row.social_capped, SOCIAL_HARD_CAP);
        let catalyst_result = catalyst_heat_guard(input.catalyst_heat, thresholds);

        let gate_results = evaluate_all(vec![
            score_result,
            vadr_result,
            funding_result,
            freshness_result,
            fatigue_result,
            late_fill_result,
            liquidity_result,
            social_result,
            catalyst_result,
        ]);
        let admitted = gate_results.iter().all(|g| g.pass);

        Ok(CandidateResult {
            symbol: orth_row.symbol.clone(),
            final_score: scored.final_score,
            orthogonality_preserved_momentum: orth_row.momentum_core,
            gate_results,
            admitted,
        })
    }

    fn gate_thresholds(&self) -> GateThresholds {
        let g = &self.config.gates;
        GateThresholds {
            score_min: g.score_min,
            vadr_min_samples: g.vadr_min_samples,
            funding_z_threshold: g.funding_z_threshold,
            funding_window_bars: 180,
            bar_age_max: g.bar_age_max,
            atr_multiple: g.atr_multiple,
            late_fill_seconds: g.late_fill_seconds,
            max_hold_hours: g.max_hold_hours,
            fatigue_r24h_pct: g.fatigue_r24h_pct,
            fatigue_rsi4h: g.fatigue_rsi4h,
            catalyst_heat_cap: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderBookSnapshot, ProviderKind, RawFactorRow};
    use crate::facade::breaker::BreakerConfig;
    use crate::facade::limiter::RateLimitConfig;
    use crate::facade::venue::{VenueAdapter, VenueError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap as Map;
    use tempfile::tempdir;

    struct UnusedAdapter;

    #[async_trait]
    impl VenueAdapter for UnusedAdapter {
        fn name(&self) -> &str {
            "unused"
        }
        fn provider_kind(&self) -> ProviderKind {
            ProviderKind::VenueNative
        }
        async fn fetch_trades(&self, _s: &Symbol, _l: u32) -> Result<Vec<crate::domain::Trade>, VenueError> {
            unimplemented!()
        }
        async fn fetch_klines(&self, _s: &Symbol, _i: crate::domain::Interval, _l: u32) -> Result<Vec<crate::domain::Bar>, VenueError> {
            unimplemented!()
        }
        async fn fetch_order_book(&self, _s: &Symbol, _d: u32) -> Result<OrderBookSnapshot, VenueError> {
            unimplemented!()
        }
        async fn fetch_funding(&self, _s: &Symbol) -> Result<crate::domain::FundingRate, VenueError> {
            unimplemented!()
        }
        async fn fetch_open_interest(&self, _s: &Symbol) -> Result<crate::domain::OpenInterest, VenueError> {
            unimplemented!()
        }
        async fn stream_trades(&self, _s: &Symbol) -> Result<tokio::sync::broadcast::Receiver<crate::domain::Trade>, VenueError> {
            unimplemented!()
        }
        async fn stream_klines(&self, _s: &Symbol, _i: crate::domain::Interval) -> Result<tokio::sync::broadcast::Receiver<crate::domain::Bar>, VenueError> {
            unimplemented!()
        }
        async fn stream_order_book(&self, _s: &Symbol) -> Result<tokio::sync::broadcast::Receiver<OrderBookSnapshot>, VenueError> {
            unimplemented!()
        }
        async fn stream_funding(&self, _s: &Symbol) -> Result<tokio::sync::broadcast::Receiver<crate::domain::FundingRate>, VenueError> {
            unimplemented!()
        }
    }

    fn row(symbol: &str, momentum: f64, score_inputs: f64) -> RawFactorRow {
        RawFactorRow {
            symbol: Symbol::new(symbol, "USD"),
            timestamp: Utc::now(),
            momentum_core: momentum,
            technical: score_inputs,
            volume: score_inputs,
            quality: score_inputs,
            social: 0.0,
            factor_details: Map::new(),
        }
    }

    fn tier() -> TierLimits {
        TierLimits { vadr_floor: 1.0, spread_bps_cap: 50.0, depth_usd_floor: 10_000.0 }
    }

    /// Every gate/guard input tuned to pass cleanly, so a test can flip a
    /// single field to isolate the gate/guard it cares about.
    fn symbol_input(row: RawFactorRow, vadr_sample_count: usize) -> SymbolInput {
        SymbolInput {
            row,
            vadr: 5.0,
            vadr_p80: 1.0,
            vadr_sample_count,
            tier: tier(),
            snapshot_ids: vec![],
            funding: FundingGateInput {
                venue_median_funding_z: -2.0,
                spot_vwap_holds: true,
                spot_cvd: 1.0,
                perp_cvd: -1.0,
                worst_feed_staleness_multiplier: 1.0,
            },
            freshness: FreshnessGuardInput { bar_age: 1.0, last_price_move_abs: 10.0, atr_1h: 100.0 },
            fatigue: FatigueGuardInput { r24h_pct: 5.0, rsi4h: 50.0, delta_r4h: 0.0, accel_renewal: false },
            late_fill: LateFillGuardInput { seconds_since_signal_bar_close: 5.0 },
            liquidity: LiquidityGuardInput { spread_bps_60s_avg: 10.0, depth_usd_pct2: 50_000.0, is_venue_native: true },
            catalyst_heat: 0.0,
        }
    }

    #[tokio::test]
    async fn cycle_ranks_by_score_desc_and_truncates_top_n() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.orchestrator.top_n = 1;
        let facade = DataFacade::new(
            vec![(Box::new(UnusedAdapter), RateLimitConfig::default(), BreakerConfig::default())],
            dir.path(),
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config, facade);

        let inputs = vec![
            symbol_input(row("BTC", 90.0, 90.0), 25),
            symbol_input(row("ETH", 40.0, 40.0), 25),
        ];
        let regime_snapshot = RegimeSnapshot { regime: crate::regime::Regime::Choppy, confidence: 1.0, committed_at_unix: 0 };
        let result = orchestrator.run_cycle(inputs, vec![], regime_snapshot).await.unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].symbol, Symbol::new("BTC", "USD"));
    }

    #[tokio::test]
    async fn low_vadr_sample_count_fails_closed() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let facade = DataFacade::new(
            vec![(Box::new(UnusedAdapter), RateLimitConfig::default(), BreakerConfig::default())],
            dir.path(),
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config, facade);
        let inputs = vec![symbol_input(row("BTC", 90.0, 90.0), 3)];
        let regime_snapshot = RegimeSnapshot { regime: crate::regime::Regime::Choppy, confidence: 1.0, committed_at_unix: 0 };
        let result = orchestrator.run_cycle(inputs, vec![], regime_snapshot).await.unwrap();
        assert!(!result.candidates[0].admitted);
    }

    #[tokio::test]
    async fn fatigued_candidate_blocked_despite_high_score() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let facade = DataFacade::new(
            vec![(Box::new(UnusedAdapter), RateLimitConfig::default(), BreakerConfig::default())],
            dir.path(),
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config, facade);
        let mut input = symbol_input(row("BTC", 90.0, 90.0), 25);
        input.fatigue = FatigueGuardInput { r24h_pct: 20.0, rsi4h: 80.0, delta_r4h: 0.0, accel_renewal: false };
        let regime_snapshot = RegimeSnapshot { regime: crate::regime::Regime::Choppy, confidence: 1.0, committed_at_unix: 0 };
        let result = orchestrator.run_cycle(vec![input], vec![], regime_snapshot).await.unwrap();
        assert!(!result.candidates[0].admitted);
        assert!(result.candidates[0].gate_results.iter().any(|g| g.name == "fatigue" && !g.pass));
    }

    #[tokio::test]
    async fn aggregator_sourced_candidate_blocked_by_liquidity_guard() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let facade = DataFacade::new(
            vec![(Box::new(UnusedAdapter), RateLimitConfig::default(), BreakerConfig::default())],
            dir.path(),
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config, facade);
        let mut input = symbol_input(row("BTC", 90.0, 90.0), 25);
        input.liquidity.is_venue_native = false;
        let regime_snapshot = RegimeSnapshot { regime: crate::regime::Regime::Choppy, confidence: 1.0, committed_at_unix: 0 };
        let result = orchestrator.run_cycle(vec![input], vec![], regime_snapshot).await.unwrap();
        assert!(!result.candidates[0].admitted);
        assert!(result.candidates[0].gate_results.iter().any(|g| g.name == "liquidity" && !g.pass));
    }
}
