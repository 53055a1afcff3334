//! Rate engine error types.

use agritrace_common::CurrencyPair;
use thiserror::Error;

/// Errors that can occur while resolving a rate.
#[derive(Debug, Clone, Error)]
pub enum RateError {
    /// Every provider failed and nothing is cached for the pair.
    #[error("Rate unavailable for {0}")]
    RateUnavailable(CurrencyPair),

    /// A provider call failed.
    #[error("Provider {provider} failed to fetch {pair}: {reason}")]
    ProviderFetchFailed {
        provider: String,
        pair: CurrencyPair,
        reason: String,
    },

    /// The provider does not quote this pair.
    #[error("Provider {provider} does not support {pair}")]
    UnsupportedPair { provider: String, pair: CurrencyPair },

    /// The provider returned a zero, negative or unrepresentable rate.
    #[error("Provider {provider} returned invalid rate {rate} for {pair}")]
    InvalidRate {
        provider: String,
        pair: CurrencyPair,
        rate: String,
    },

    /// The provider did not answer within the configured timeout.
    #[error("Provider {provider} timed out fetching {pair}")]
    Timeout { provider: String, pair: CurrencyPair },

    /// The converted amount does not fit in a decimal.
    #[error("Converting {amount} over {pair} overflows")]
    ConversionOverflow { pair: CurrencyPair, amount: String },
}

impl RateError {
    /// Provider-level failures are recoverable: they trigger the next link
    /// of the chain. Exhaustion and overflow are surfaced to callers.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RateError::RateUnavailable(_) | RateError::ConversionOverflow { .. }
        )
    }

    /// Get error code for logs and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            RateError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            RateError::ProviderFetchFailed { .. } => "PROVIDER_FETCH_FAILED",
            RateError::UnsupportedPair { .. } => "UNSUPPORTED_PAIR",
            RateError::InvalidRate { .. } => "INVALID_RATE",
            RateError::Timeout { .. } => "PROVIDER_TIMEOUT",
            RateError::ConversionOverflow { .. } => "CONVERSION_OVERFLOW",
        }
    }
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
