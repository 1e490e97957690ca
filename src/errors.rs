use crate::types::ProviderKind;
use smallvec::SmallVec;
use std::time::Duration;

/// Fallback chains hold at most one attempt per configured provider,
/// so the list stays inline.
pub type Attempts = SmallVec<[ProviderAttempt; 3]>;

/// Failure reported by a single provider adapter. Adapters never panic
/// past their boundary; every transport or schema problem becomes one of
/// these so the acquisition manager can fall through.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {detail}")]
    RateLimited {
        detail: String,
        /// Retry-after hint when the provider communicates one.
        retry_after: Option<Duration>,
    },

    #[error("no data: {0}")]
    NoData(String),

    #[error("malformed response: {0}")]
    MalformedSchema(String),
}

impl ProviderFailure {
    /// Transient failures get one bounded retry; auth and schema
    /// failures do not.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderFailure::Network(_) | ProviderFailure::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderFailure::Network(format!("timeout: {e}"))
        } else {
            ProviderFailure::Network(e.to_string())
        }
    }
}

/// One recorded attempt in a fallback sequence.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: ProviderKind,
    pub failure: ProviderFailure,
}

impl std::fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.failure)
    }
}

/// Acquisition-level error. Callers must never interpret this as a zero
/// price; a symbol with no trustworthy data yields no contracts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AcquisitionError {
    #[error("all providers failed for {symbol}: [{}]",
        .attempts.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("; "))]
    AllProvidersFailed {
        symbol: String,
        attempts: Attempts,
    },

    #[error("no providers configured")]
    NoProvidersConfigured,
}

/// Pricing-level error. Excludes the single contract, never the batch,
/// and never degrades into a default financial figure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PricingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Configuration error: missing credentials, unparseable values, or
/// threshold bands that cannot describe a valid screen.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing env var: {0}")]
    MissingVar(String),

    #[error("invalid value for {key}: {detail}")]
    InvalidValue { key: String, detail: String },

    #[error("invalid band {name}: {detail}")]
    InvalidBand { name: &'static str, detail: String },
}
