//! End-to-end screening pipeline.
//!
//! Fans out chain acquisition across the watchlist with bounded
//! concurrency, enriches every contract (valuation, then liquidity),
//! screens, ranks, and reports. A failing symbol or an unpriceable
//! contract is recorded and excluded; it never becomes a zero-valued
//! row and never aborts the batch.

use crate::acquisition::AcquisitionManager;
use crate::cache::MarketCache;
use crate::config::ScreenerConfig;
use crate::errors::{AcquisitionError, ConfigError, PricingError};
use crate::providers::{build_providers, UsageStats};
use crate::rank::{self, RankedContract};
use crate::screen::{self, RejectedContract};
use crate::types::{ChainSnapshot, OptionContract, PricedContract};
use crate::{liquidity, pricing};
use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use std::sync::Arc;

/// Why a contract was excluded before screening.
#[derive(Debug, Clone)]
pub enum SkipReason {
    Pricing(PricingError),
    MissingLiquidityInputs,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Pricing(e) => write!(f, "{e}"),
            SkipReason::MissingLiquidityInputs => {
                write!(f, "missing volume, open interest, or two-sided quote")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedContract {
    pub contract: OptionContract,
    pub reason: SkipReason,
}

/// A symbol for which every provider failed.
#[derive(Debug, Clone)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: Arc<AcquisitionError>,
}

/// Complete outcome of one screening run. Everything that entered the
/// pipeline leaves through exactly one of these buckets.
#[derive(Debug, Default)]
pub struct ScreenReport {
    /// Top K by composite score.
    pub top: Vec<RankedContract>,
    /// Full ranked set of contracts that passed every band.
    pub ranked: Vec<RankedContract>,
    /// Contracts rejected by a screening band, with the band named.
    pub rejected: Vec<RejectedContract>,
    /// Contracts excluded before screening for missing real inputs.
    pub skipped: Vec<SkippedContract>,
    /// Symbols that yielded no trustworthy data from any provider.
    pub failures: Vec<SymbolFailure>,
}

pub struct Screener {
    manager: Arc<AcquisitionManager>,
    config: ScreenerConfig,
}

impl Screener {
    /// Build from environment configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ScreenerConfig::from_env()?)
    }

    pub fn new(config: ScreenerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let providers = build_providers(&config);
        let cache = MarketCache::new(config.quote_ttl, config.chain_ttl);
        let manager = Arc::new(AcquisitionManager::new(
            providers,
            cache,
            config.retry_backoff,
        ));
        Ok(Self { manager, config })
    }

    /// Build around an existing manager. Used when callers share one
    /// acquisition layer across screeners.
    pub fn with_manager(
        config: ScreenerConfig,
        manager: Arc<AcquisitionManager>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { manager, config })
    }

    /// Screen the watchlist against the configured bands and rank the
    /// survivors. The risk-free rate is an injected real input; an
    /// unavailable rate fails the whole run up front.
    pub async fn run(
        &self,
        watchlist: &[String],
        risk_free_rate: f64,
    ) -> Result<ScreenReport, PricingError> {
        if !risk_free_rate.is_finite() || risk_free_rate < 0.0 {
            return Err(PricingError::invalid(format!(
                "risk-free rate unavailable or invalid ({risk_free_rate})"
            )));
        }

        let today = Utc::now().date_naive();
        tracing::info!(symbols = watchlist.len(), rate = risk_free_rate, "screening run started");

        let fetches: Vec<(String, Result<Arc<ChainSnapshot>, Arc<AcquisitionError>>)> =
            stream::iter(watchlist.iter().cloned())
                .map(|symbol| {
                    let manager = Arc::clone(&self.manager);
                    async move {
                        let outcome = manager.get_option_chain(&symbol).await;
                        (symbol, outcome)
                    }
                })
                .buffer_unordered(self.config.max_concurrent_symbols)
                .collect()
                .await;

        let mut priced = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();

        for (symbol, outcome) in fetches {
            match outcome {
                Ok(snapshot) => {
                    self.enrich_chain(&snapshot, risk_free_rate, today, &mut priced, &mut skipped);
                }
                Err(error) => {
                    tracing::error!(symbol = %symbol, error = %error, "symbol yielded no data");
                    failures.push(SymbolFailure { symbol, error });
                }
            }
        }

        let outcome = screen::screen(priced, &self.config.bands);
        let ranked = rank::rank(outcome.passed, &self.config.ranking);
        let top = rank::top_k(&ranked, self.config.top_k).to_vec();

        tracing::info!(
            ranked = ranked.len(),
            rejected = outcome.rejected.len(),
            skipped = skipped.len(),
            failed = failures.len(),
            "screening run complete"
        );

        Ok(ScreenReport {
            top,
            ranked,
            rejected: outcome.rejected,
            skipped,
            failures,
        })
    }

    fn enrich_chain(
        &self,
        snapshot: &ChainSnapshot,
        rate: f64,
        today: NaiveDate,
        priced: &mut Vec<PricedContract>,
        skipped: &mut Vec<SkippedContract>,
    ) {
        for contract in &snapshot.contracts {
            match pricing::value_contract(contract, snapshot.underlying_price, rate, today) {
                Ok(valuation) => match liquidity::score(contract, &self.config.liquidity) {
                    Some(score) => priced.push(PricedContract::new(
                        contract.clone(),
                        snapshot.underlying_price,
                        valuation,
                        score,
                    )),
                    None => skipped.push(SkippedContract {
                        contract: contract.clone(),
                        reason: SkipReason::MissingLiquidityInputs,
                    }),
                },
                Err(err) => {
                    tracing::debug!(
                        underlying = %contract.underlying,
                        strike = contract.strike,
                        error = %err,
                        "contract excluded from pricing"
                    );
                    skipped.push(SkippedContract {
                        contract: contract.clone(),
                        reason: SkipReason::Pricing(err),
                    });
                }
            }
        }
    }

    /// Provider usage accounting for the run.
    pub fn usage(&self) -> Vec<UsageStats> {
        self.manager.usage()
    }
}
