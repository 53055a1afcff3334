//! Early-warning system error types.

use agritrace_common::{FarmId, StoreError};
use thiserror::Error;

/// Errors raised while producing risk findings for a farm.
#[derive(Debug, Clone, Error)]
pub enum EwsError {
    /// The farm used up its forecast fetches for the current window.
    #[error("Forecast rate limit exceeded for farm {farm_id}, retry in {retry_after_secs}s")]
    RateLimitExceeded { farm_id: FarmId, retry_after_secs: i64 },

    #[error("Forecast provider {provider} failed: {reason}")]
    ProviderFetchFailed { provider: String, reason: String },

    /// The provider answered with a body its parser could not map.
    #[error("Forecast provider {provider} returned an invalid payload: {reason}")]
    InvalidPayload { provider: String, reason: String },

    #[error("Forecast provider {provider} timed out")]
    Timeout { provider: String },

    #[error("Farm {farm_id} has invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { farm_id: FarmId, lat: f64, lon: f64 },

    #[error("Unknown farm: {0}")]
    UnknownFarm(FarmId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EwsError {
    /// Whether a later attempt may succeed without operator action.
    /// A rate-limited farm must wait out its window rather than retry at once.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EwsError::ProviderFetchFailed { .. } | EwsError::Timeout { .. } | EwsError::Store(_)
        )
    }

    /// Get error code for logs and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            EwsError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            EwsError::ProviderFetchFailed { .. } => "PROVIDER_FETCH_FAILED",
            EwsError::InvalidPayload { .. } => "INVALID_PAYLOAD",
            EwsError::Timeout { .. } => "PROVIDER_TIMEOUT",
            EwsError::InvalidCoordinates { .. } => "INVALID_COORDINATES",
            EwsError::UnknownFarm(_) => "UNKNOWN_FARM",
            EwsError::Store(e) => e.error_code(),
        }
    }
}

/// Result type for early-warning operations.
pub type EwsResult<T> = Result<T, EwsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_not_recoverable() {
        let err = EwsError::RateLimitExceeded {
            farm_id: FarmId::new("farm-1"),
            retry_after_secs: 120,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(
            err.to_string(),
            "Forecast rate limit exceeded for farm farm-1, retry in 120s"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: EwsError = StoreError::persistence("insert_alerts", "disk full").into();
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "PERSISTENCE_FAILED");
    }
}
