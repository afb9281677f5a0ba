//! CryptoRun - 6-48 hour cryptocurrency momentum scanner.

use anyhow::{Context, Result};
use clap::Parser;
use cryptorun::config::Config;
use cryptorun::facade::breaker::BreakerConfig;
use cryptorun::facade::limiter::RateLimitConfig;
use cryptorun::facade::DataFacade;
use cryptorun::orchestrator::Orchestrator;
use cryptorun::regime::RegimeSnapshot;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cryptorun", about = "6-48 hour cryptocurrency momentum scanner")]
struct Cli {
    /// Path to a TOML config file overlaying the defaults.
    #[arg(long, env = "CRYPTORUN_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single scan cycle and exit instead of looping forever.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log_level);

    info!("CryptoRun scanner starting");

    let facade = DataFacade::new(
        vec![(
            Box::new(NoopAdapter),
            RateLimitConfig::from(config.rate_limit),
            BreakerConfig::from(config.breaker),
        )],
        config.pit_store_dir.clone(),
    )
    .context("failed to initialize data facade")?;

    let cycle_deadline = Duration::from_secs(config.orchestrator.cycle_deadline_secs);
    let orchestrator = Orchestrator::new(config.clone(), facade);

    loop {
        let regime_snapshot = RegimeSnapshot::default();
        match orchestrator.run_cycle(Vec::new(), Vec::new(), regime_snapshot).await {
            Ok(result) => {
                info!(
                    run_id = %result.run_id,
                    admitted = result.candidates.iter().filter(|c| c.admitted).count(),
                    "cycle finished"
                );
            }
            Err(e) => warn!(error = %e, "scan cycle failed"),
        }

        if cli.once {
            break;
        }
        tokio::time::sleep(cycle_deadline).await;
    }

    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Placeholder adapter wired in until venue adapters are registered from
/// config; production deployments register real `VenueAdapter`
/// implementations (e.g. Binance) here instead.
struct NoopAdapter;

#[async_trait::async_trait]
impl cryptorun::facade::venue::VenueAdapter for NoopAdapter {
    fn name(&self) -> &str {
        "noop"
    }
    fn provider_kind(&self) -> cryptorun::domain::ProviderKind {
        cryptorun::domain::ProviderKind::VenueNative
    }
    async fn fetch_trades(
        &self,
        _symbol: &cryptorun::domain::Symbol,
        _limit: u32,
    ) -> Result<Vec<cryptorun::domain::Trade>, cryptorun::facade::venue::VenueError> {
        Ok(Vec::new())
    }
    async fn fetch_klines(
        &self,
        _symbol: &cryptorun::domain::Symbol,
        _interval: cryptorun::domain::Interval,
        _limit: u32,
    ) -> Result<Vec<cryptorun::domain::Bar>, cryptorun::facade::venue::VenueError> {
        Ok(Vec::new())
    }
    async fn fetch_order_book(
        &self,
        _symbol: &cryptorun::domain::Symbol,
        _depth: u32,
    ) -> Result<cryptorun::domain::OrderBookSnapshot, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn fetch_funding(
        &self,
        _symbol: &cryptorun::domain::Symbol,
    ) -> Result<cryptorun::domain::FundingRate, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn fetch_open_interest(
        &self,
        _symbol: &cryptorun::domain::Symbol,
    ) -> Result<cryptorun::domain::OpenInterest, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn stream_trades(
        &self,
        _symbol: &cryptorun::domain::Symbol,
    ) -> Result<tokio::sync::broadcast::Receiver<cryptorun::domain::Trade>, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn stream_klines(
        &self,
        _symbol: &cryptorun::domain::Symbol,
        _interval: cryptorun::domain::Interval,
    ) -> Result<tokio::sync::broadcast::Receiver<cryptorun::domain::Bar>, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn stream_order_book(
        &self,
        _symbol: &cryptorun::domain::Symbol,
    ) -> Result<tokio::sync::broadcast::Receiver<cryptorun::domain::OrderBookSnapshot>, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
    async fn stream_funding(
        &self,
        _symbol: &cryptorun::domain::Symbol,
    ) -> Result<tokio::sync::broadcast::Receiver<cryptorun::domain::FundingRate>, cryptorun::facade::venue::VenueError> {
        Err(cryptorun::facade::venue::VenueError::Transport("no venues configured".to_string()))
    }
}
