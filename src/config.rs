//! Crate-wide configuration.
//!
//! Nested config-struct-with-`Default` layout grounded on
//! `route_quality/config.rs`'s `RouteQualityConfig`; environment/TOML
//! overlay loading grounded on `models.rs::Config::from_env`, extended
//! here to also accept a TOML file (spec.md §6 requires every tunable be
//! externally configurable, not just env-overridable).

use crate::facade::breaker::BreakerConfig as FacadeBreakerConfig;
use crate::facade::limiter::RateLimitConfig;
use crate::regime::RegimeThresholds;
use crate::scorer::ScoreWeightProfiles;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub rate_limit: RateLimitSection,
    pub breaker: BreakerSection,
    pub regime: RegimeConfig,
    pub scoring: ScoringConfig,
    pub gates: GatesConfig,
    pub orchestrator: OrchestratorConfig,
    pub pit_store_dir: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            rate_limit: RateLimitSection::default(),
            breaker: BreakerSection::default(),
            regime: RegimeConfig::default(),
            scoring: ScoringConfig::default(),
            gates: GatesConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            pit_store_dir: "./data/pit".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub trades_ttl_secs: u64,
    pub klines_ttl_secs: u64,
    pub l1_ttl_secs: u64,
    pub l2_ttl_secs: u64,
    pub funding_ttl_secs: u64,
    pub open_interest_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            trades_ttl_secs: 30,
            klines_ttl_secs: 60,
            l1_ttl_secs: 5,
            l2_ttl_secs: 10,
            funding_ttl_secs: 300,
            open_interest_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSection {
    pub requests_per_second: f64,
    pub burst_allowance: u32,
    pub hourly_cap: Option<u64>,
    pub daily_cap: Option<u64>,
    pub monthly_cap: Option<u64>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_allowance: 20,
            hourly_cap: None,
            daily_cap: None,
            monthly_cap: None,
        }
    }
}

impl From<RateLimitSection> for RateLimitConfig {
    fn from(s: RateLimitSection) -> Self {
        Self {
            requests_per_second: s.requests_per_second,
            burst_allowance: s.burst_allowance,
            hourly_cap: s.hourly_cap,
            daily_cap: s.daily_cap,
            monthly_cap: s.monthly_cap,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: u64,
    pub max_half_open_requests: u32,
    pub error_rate_threshold: f64,
    pub min_sample_size: usize,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_secs: 30,
            max_half_open_requests: 3,
            error_rate_threshold: 0.5,
            min_sample_size: 10,
        }
    }
}

impl From<BreakerSection> for FacadeBreakerConfig {
    fn from(s: BreakerSection) -> Self {
        Self {
            failure_threshold: s.failure_threshold,
            success_threshold: s.success_threshold,
            timeout: Duration::from_secs(s.timeout_secs),
            max_requests: s.max_half_open_requests,
            error_rate_threshold: s.error_rate_threshold,
            min_sample_size: s.min_sample_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub detection_cadence_hours: u64,
    pub stability_window_len: usize,
    pub thresholds: RegimeThresholds,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            detection_cadence_hours: 4,
            stability_window_len: 3,
            thresholds: RegimeThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weight_sum_tolerance: f64,
    pub weight_profiles: ScoreWeightProfiles,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_sum_tolerance: 0.05,
            weight_profiles: ScoreWeightProfiles::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GatesConfig {
    pub score_min: f64,
    pub vadr_min_samples: usize,
    pub funding_z_threshold: f64,
    pub bar_age_max: f64,
    pub atr_multiple: f64,
    pub late_fill_seconds: f64,
    pub max_hold_hours: f64,
    pub fatigue_r24h_pct: f64,
    pub fatigue_rsi4h: f64,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            score_min: 75.0,
            vadr_min_samples: 20,
            funding_z_threshold: -1.5,
            bar_age_max: 2.0,
            atr_multiple: 1.2,
            late_fill_seconds: 30.0,
            max_hold_hours: 48.0,
            fatigue_r24h_pct: 12.0,
            fatigue_rsi4h: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub cycle_deadline_secs: u64,
    pub per_request_deadline_secs: u64,
    pub top_n: usize,
    pub parallelism: usize,
    pub drop_partial_symbols: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_deadline_secs: 300,
            per_request_deadline_secs: 30,
            top_n: 20,
            parallelism: 8,
            drop_partial_symbols: true,
        }
    }
}

impl Config {
    /// Load from an optional TOML file overlaid with `CRYPTORUN_*`
    /// environment variables, falling back to defaults for anything unset
    /// (`models.rs::Config::from_env`'s unwrap_or_else chain, generalized
    /// to a structured config rather than flat scalars).
    pub fn load(toml_path: Option<&Path>) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            _ => Config::default(),
        };

        if let Ok(dir) = std::env::var("CRYPTORUN_PIT_STORE_DIR") {
            config.pit_store_dir = dir;
        }
        if let Ok(level) = std::env::var("CRYPTORUN_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(top_n) = std::env::var("CRYPTORUN_TOP_N") {
            config.orchestrator.top_n = top_n.parse().unwrap_or(config.orchestrator.top_n);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_examples() {
        let config = Config::default();
        assert_eq!(config.cache.klines_ttl_secs, 60);
        assert_eq!(config.gates.score_min, 75.0);
        assert_eq!(config.orchestrator.top_n, 20);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.regime.detection_cadence_hours, 4);
    }

    #[test]
    fn load_reads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cryptorun.toml");
        std::fs::write(&path, "pit_store_dir = \"/tmp/pit\"\nlog_level = \"debug\"\n\n[cache]\ntrades_ttl_secs = 30\nklines_ttl_secs = 60\nl1_ttl_secs = 5\nl2_ttl_secs = 10\nfunding_ttl_secs = 300\nopen_interest_ttl_secs = 60\n\n[rate_limit]\nrequests_per_second = 10.0\nburst_allowance = 20\n\n[breaker]\nfailure_threshold = 5\nsuccess_threshold = 3\ntimeout_secs = 30\nmax_half_open_requests = 3\nerror_rate_threshold = 0.5\nmin_sample_size = 10\n\n[regime]\ndetection_cadence_hours = 4\nstability_window_len = 3\n[regime.thresholds]\nvol_low = 0.30\nvol_high = 0.60\nbull = 0.65\nbear = 0.35\nthrust = 0.15\n\n[scoring]\nweight_sum_tolerance = 0.05\n[scoring.weight_profiles.trending_bull]\nmomentum = 0.50\ntechnical = 0.20\nvolume = 0.15\nquality = 0.15\n[scoring.weight_profiles.choppy]\nmomentum = 0.35\ntechnical = 0.25\nvolume = 0.20\nquality = 0.20\n[scoring.weight_profiles.high_vol]\nmomentum = 0.30\ntechnical = 0.20\nvolume = 0.30\nquality = 0.20\n\n[gates]\nscore_min = 75.0\nvadr_min_samples = 20\nfunding_z_threshold = -1.5\nbar_age_max = 2.0\natr_multiple = 1.2\nlate_fill_seconds = 30.0\nmax_hold_hours = 48.0\nfatigue_r24h_pct = 12.0\nfatigue_rsi4h = 70.0\n\n[orchestrator]\ncycle_deadline_secs = 300\nper_request_deadline_secs = 30\ntop_n = 20\nparallelism = 8\ndrop_partial_symbols = true\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.pit_store_dir, "/tmp/pit");
        assert_eq!(config.log_level, "debug");
    }
}
