//! Crate-wide error taxonomy.
//!
//! Each module already owns a narrow `thiserror` enum for its own failure
//! modes (`facade::limiter::RateLimitError`, `facade::breaker`'s implicit
//! `Err(())`, `facade::pit::PitStoreError`, `orthogonal::OrthogonalizerError`,
//! `scorer::ScorerError`). `CoreError` here is the orchestrator-facing
//! umbrella that classifies any of those into the kinds spec.md §7 names
//! (transient, rate-limited, data-quality, policy, resource-exhaustion,
//! fatal), the same "wrap the leaf error, classify at the boundary"
//! shape `risk.rs::RiskManager` uses for its guardrail flags.

use crate::facade::limiter::RateLimitError;
use crate::facade::pit::PitStoreError;
use crate::facade::venue::VenueError;
use crate::facade::FacadeError;
use crate::orthogonal::OrthogonalizerError;
use crate::scorer::ScorerError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    RateLimited,
    DataQuality,
    Policy,
    ResourceExhaustion,
    Fatal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Facade(#[from] FacadeError),
    #[error(transparent)]
    Orthogonalizer(#[from] OrthogonalizerError),
    #[error(transparent)]
    Scorer(#[from] ScorerError),
    #[error(transparent)]
    Pit(#[from] PitStoreError),
    #[error("scan cycle exceeded its deadline")]
    CycleDeadlineExceeded,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Facade(FacadeError::RateLimited(_)) => ErrorKind::RateLimited,
            CoreError::Facade(FacadeError::ProviderDegraded(_)) => ErrorKind::Transient,
            CoreError::Facade(FacadeError::Venue(VenueError::AggregatorBan)) => ErrorKind::Policy,
            CoreError::Facade(FacadeError::Venue(_)) => ErrorKind::Transient,
            CoreError::Facade(FacadeError::NoVenueAvailable(_)) => ErrorKind::ResourceExhaustion,
            CoreError::Facade(FacadeError::Pit(_)) => ErrorKind::Fatal,
            CoreError::Orthogonalizer(_) => ErrorKind::DataQuality,
            CoreError::Scorer(_) => ErrorKind::DataQuality,
            CoreError::Pit(_) => ErrorKind::Fatal,
            CoreError::CycleDeadlineExceeded => ErrorKind::ResourceExhaustion,
        }
    }

    /// Whether the orchestrator should retry this symbol next cycle
    /// rather than drop it outright.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

impl From<RateLimitError> for CoreError {
    fn from(e: RateLimitError) -> Self {
        CoreError::Facade(FacadeError::RateLimited(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_ban_classified_as_policy() {
        let err = CoreError::Facade(FacadeError::Venue(VenueError::AggregatorBan));
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limited_is_retryable() {
        let err = CoreError::from(RateLimitError::BucketEmpty);
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
    }
}
