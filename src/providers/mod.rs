//! Provider adapters.
//!
//! One adapter per data source, each normalizing to the common chain
//! schema and reporting typed failures so the acquisition manager can
//! fall through. Business logic never names a concrete provider; the
//! manager iterates whatever order configuration gives it.

pub mod polygon;
pub mod tiingo;
pub mod yahoo;

#[cfg(test)]
pub mod mock;

use crate::config::ScreenerConfig;
use crate::errors::ProviderFailure;
use crate::types::{ChainSnapshot, OptionContract, ProviderKind, Quote};
use portable_atomic::{AtomicU64, Ordering};

pub use polygon::PolygonClient;
pub use tiingo::TiingoClient;
pub use yahoo::YahooClient;

/// Per-adapter request accounting.
#[derive(Debug, Default)]
pub struct ProviderUsage {
    requests: AtomicU64,
    failures: AtomicU64,
}

impl ProviderUsage {
    #[inline]
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_used(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failures_seen(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Snapshot of an adapter's usage, including remaining budget when the
/// provider has a local one.
#[derive(Debug, Clone, Copy)]
pub struct UsageStats {
    pub provider: ProviderKind,
    pub requests_used: u64,
    pub failures: u64,
    pub budget_remaining: Option<u64>,
}

/// The fallback chain's polymorphic fetch capability.
#[derive(Debug)]
pub enum Provider {
    Institutional(PolygonClient),
    Secondary(TiingoClient),
    Free(YahooClient),
    #[cfg(test)]
    Mock(mock::MockProvider),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Institutional(_) => ProviderKind::Institutional,
            Provider::Secondary(_) => ProviderKind::Secondary,
            Provider::Free(_) => ProviderKind::Free,
            #[cfg(test)]
            Provider::Mock(m) => m.kind,
        }
    }

    /// Fetch and normalize the full option chain for a symbol.
    pub async fn fetch_chain(&self, symbol: &str) -> Result<ChainSnapshot, ProviderFailure> {
        match self {
            Provider::Institutional(c) => c.fetch_chain(symbol).await,
            Provider::Secondary(c) => c.fetch_chain(symbol).await,
            Provider::Free(c) => c.fetch_chain(symbol).await,
            #[cfg(test)]
            Provider::Mock(m) => m.fetch_chain(symbol).await,
        }
    }

    /// Fetch the underlying spot quote for a symbol.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderFailure> {
        match self {
            Provider::Institutional(c) => c.fetch_quote(symbol).await,
            Provider::Secondary(c) => c.fetch_quote(symbol).await,
            Provider::Free(c) => c.fetch_quote(symbol).await,
            #[cfg(test)]
            Provider::Mock(m) => m.fetch_quote(symbol).await,
        }
    }

    pub fn usage_stats(&self) -> UsageStats {
        match self {
            Provider::Institutional(c) => c.usage_stats(),
            Provider::Secondary(c) => c.usage_stats(),
            Provider::Free(c) => c.usage_stats(),
            #[cfg(test)]
            Provider::Mock(m) => m.usage_stats(),
        }
    }
}

/// Build the adapter chain in configured priority order. Keyed
/// providers without credentials are skipped with a warning rather
/// than failing the whole run.
pub fn build_providers(cfg: &ScreenerConfig) -> Vec<Provider> {
    let mut providers = Vec::new();

    for kind in &cfg.provider_priority {
        match kind {
            ProviderKind::Institutional => match &cfg.polygon_api_key {
                Some(key) => providers.push(Provider::Institutional(PolygonClient::new(
                    key.clone(),
                    cfg.polygon_base_url.clone(),
                ))),
                None => {
                    tracing::warn!("institutional provider skipped: no API key configured");
                }
            },
            ProviderKind::Secondary => match &cfg.tiingo_api_key {
                Some(key) => providers.push(Provider::Secondary(TiingoClient::new(
                    key.clone(),
                    cfg.tiingo_base_url.clone(),
                    cfg.secondary_hourly_budget,
                ))),
                None => {
                    tracing::warn!("secondary provider skipped: no API key configured");
                }
            },
            ProviderKind::Free => providers.push(Provider::Free(YahooClient::new(
                cfg.yahoo_base_url.clone(),
                cfg.chain_max_expiries,
                cfg.chain_min_days,
            ))),
        }
    }

    providers
}

/// Drop contracts violating the bid <= ask invariant at the adapter
/// boundary; the rest of the pipeline may assume consistent quotes.
pub(crate) fn drop_inconsistent(symbol: &str, contracts: Vec<OptionContract>) -> Vec<OptionContract> {
    let before = contracts.len();
    let kept: Vec<OptionContract> = contracts
        .into_iter()
        .filter(|c| c.quote_consistent())
        .collect();

    let dropped = before - kept.len();
    if dropped > 0 {
        tracing::warn!(
            symbol = %symbol,
            dropped,
            "dropped contracts with crossed bid/ask"
        );
    }
    kept
}
