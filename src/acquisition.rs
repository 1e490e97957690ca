//! Acquisition manager: cache, single-flight, and provider fallback.
//!
//! Every fetch goes cache -> in-flight dedup -> providers in priority
//! order. A transient failure (network, rate limit) gets one bounded
//! retry against the same provider; auth and schema failures fall
//! through immediately. A result is only trusted when it is non-empty
//! and schema-valid, so an empty chain from one provider still reaches
//! the next one.

use crate::cache::{CacheKey, CachedPayload, MarketCache};
use crate::errors::{AcquisitionError, Attempts, ProviderAttempt, ProviderFailure};
use crate::providers::{Provider, UsageStats};
use crate::types::{ChainSnapshot, DataKind, Quote};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

type FetchResult = Result<CachedPayload, Arc<AcquisitionError>>;
type InflightMap = HashMap<CacheKey, watch::Receiver<Option<FetchResult>>>;

pub struct AcquisitionManager {
    providers: Vec<Provider>,
    cache: MarketCache,
    retry_backoff: Duration,
    // Guarded by a std mutex; never held across an await.
    inflight: Mutex<InflightMap>,
}

enum Role {
    Leader(watch::Sender<Option<FetchResult>>),
    Follower(watch::Receiver<Option<FetchResult>>),
}

/// Deregisters the leader's in-flight entry on drop, so the key is
/// released even when the leader's future is cancelled mid-fetch.
struct InflightGuard<'a> {
    registry: &'a Mutex<InflightMap>,
    key: &'a CacheKey,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.lock() {
            map.remove(self.key);
        }
    }
}

impl AcquisitionManager {
    pub fn new(providers: Vec<Provider>, cache: MarketCache, retry_backoff: Duration) -> Self {
        Self {
            providers,
            cache,
            retry_backoff,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Option chain for a symbol, served from cache when fresh.
    pub async fn get_option_chain(
        &self,
        symbol: &str,
    ) -> Result<Arc<ChainSnapshot>, Arc<AcquisitionError>> {
        match self.acquire(CacheKey::chain(symbol)).await? {
            CachedPayload::Chain(snapshot) => Ok(snapshot),
            // Chain keys only ever cache chain payloads.
            CachedPayload::Quote(_) => unreachable!("chain key produced quote payload"),
        }
    }

    /// Underlying spot quote for a symbol, served from cache when fresh.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, Arc<AcquisitionError>> {
        match self.acquire(CacheKey::quote(symbol)).await? {
            CachedPayload::Quote(quote) => Ok(quote),
            CachedPayload::Chain(_) => unreachable!("quote key produced chain payload"),
        }
    }

    /// Usage accounting across the configured adapter chain.
    pub fn usage(&self) -> Vec<UsageStats> {
        self.providers.iter().map(|p| p.usage_stats()).collect()
    }

    async fn acquire(&self, key: CacheKey) -> FetchResult {
        loop {
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit);
            }

            let role = {
                let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
                // A leader may have published between our cache miss
                // and taking the lock.
                if let Some(hit) = self.cache.get(&key) {
                    return Ok(hit);
                }
                match inflight.get(&key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = InflightGuard {
                        registry: &self.inflight,
                        key: &key,
                    };
                    let outcome = self.fetch_uncached(&key).await;
                    if let Ok(payload) = &outcome {
                        self.cache.insert(key.clone(), payload.clone());
                    }
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
                Role::Follower(mut rx) => {
                    match rx.wait_for(|v| v.is_some()).await {
                        Ok(published) => {
                            if let Some(result) = published.clone() {
                                return result;
                            }
                        }
                        Err(_) => {
                            // Leader dropped without publishing. Evict
                            // the dead entry if its guard has not landed
                            // yet, then start over.
                            let mut inflight =
                                self.inflight.lock().expect("inflight lock poisoned");
                            if let Some(existing) = inflight.get(&key) {
                                if existing.has_changed().is_err() {
                                    inflight.remove(&key);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn fetch_uncached(&self, key: &CacheKey) -> FetchResult {
        if self.providers.is_empty() {
            return Err(Arc::new(AcquisitionError::NoProvidersConfigured));
        }

        let mut attempts = Attempts::new();
        for provider in &self.providers {
            match self.attempt_with_retry(provider, key).await {
                Ok(payload) => {
                    tracing::info!(
                        symbol = %key.symbol,
                        kind = ?key.kind,
                        provider = %provider.kind(),
                        "acquired market data"
                    );
                    return Ok(payload);
                }
                Err(failure) => {
                    tracing::warn!(
                        symbol = %key.symbol,
                        kind = ?key.kind,
                        provider = %provider.kind(),
                        error = %failure,
                        "provider failed, falling through"
                    );
                    attempts.push(ProviderAttempt {
                        provider: provider.kind(),
                        failure,
                    });
                }
            }
        }

        Err(Arc::new(AcquisitionError::AllProvidersFailed {
            symbol: key.symbol.clone(),
            attempts,
        }))
    }

    /// One fetch, plus one bounded retry for transient failures only.
    async fn attempt_with_retry(
        &self,
        provider: &Provider,
        key: &CacheKey,
    ) -> Result<CachedPayload, ProviderFailure> {
        match self.fetch_once(provider, key).await {
            Err(failure) if failure.is_transient() => {
                tracing::debug!(
                    symbol = %key.symbol,
                    provider = %provider.kind(),
                    error = %failure,
                    "transient failure, retrying once"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.fetch_once(provider, key).await
            }
            other => other,
        }
    }

    async fn fetch_once(
        &self,
        provider: &Provider,
        key: &CacheKey,
    ) -> Result<CachedPayload, ProviderFailure> {
        match key.kind {
            DataKind::Quote => {
                let quote = provider.fetch_quote(&key.symbol).await?;
                let window = self.cache.quote_ttl();
                if quote_is_stale(&quote, window) {
                    return Err(ProviderFailure::NoData(format!(
                        "quote for {} is {}s old, outside the {}s freshness window",
                        key.symbol,
                        quote.age().num_seconds(),
                        window.as_secs()
                    )));
                }
                Ok(CachedPayload::Quote(quote))
            }
            DataKind::OptionChain => {
                let snapshot = provider.fetch_chain(&key.symbol).await?;
                if snapshot.is_empty() {
                    return Err(ProviderFailure::NoData(format!(
                        "empty chain for {}",
                        key.symbol
                    )));
                }
                Ok(CachedPayload::Chain(Arc::new(snapshot)))
            }
        }
    }
}

/// A provider-reported timestamp older than the freshness window is
/// not trusted, no matter how recently it was fetched.
fn quote_is_stale(quote: &Quote, window: Duration) -> bool {
    chrono::Duration::from_std(window)
        .map(|w| quote.age() > w)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::types::{OptionContract, OptionType, ProviderKind};
    use chrono::{NaiveDate, Utc};
    use portable_atomic::{AtomicU64, Ordering};

    fn chain(symbol: &str, provider: ProviderKind) -> ChainSnapshot {
        ChainSnapshot {
            underlying: symbol.into(),
            underlying_price: 100.0,
            contracts: vec![OptionContract {
                underlying: symbol.into(),
                strike: 100.0,
                expiry: NaiveDate::from_ymd_opt(2027, 6, 18).unwrap(),
                option_type: OptionType::Call,
                bid: Some(12.0),
                ask: Some(12.5),
                last: None,
                implied_vol: Some(0.3),
                open_interest: Some(100),
                volume: Some(10),
                source: provider,
            }],
            provider,
            fetched_at: Utc::now(),
        }
    }

    fn empty_chain(symbol: &str, provider: ProviderKind) -> ChainSnapshot {
        ChainSnapshot {
            underlying: symbol.into(),
            underlying_price: 100.0,
            contracts: vec![],
            provider,
            fetched_at: Utc::now(),
        }
    }

    fn manager(providers: Vec<Provider>, ttl: Duration) -> AcquisitionManager {
        AcquisitionManager::new(
            providers,
            MarketCache::new(ttl, ttl),
            Duration::from_millis(1),
        )
    }

    fn calls(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[tokio::test]
    async fn test_fallback_preserves_provenance() {
        let primary = MockProvider::with_chains(
            ProviderKind::Institutional,
            vec![Err(ProviderFailure::Unauthorized("expired key".into()))],
        );
        let fallback = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Ok(chain("AAPL", ProviderKind::Free))],
        );
        let primary_calls = primary.call_counter();
        let fallback_calls = fallback.call_counter();

        let mgr = manager(
            vec![Provider::Mock(primary), Provider::Mock(fallback)],
            Duration::from_secs(60),
        );

        let snapshot = mgr.get_option_chain("AAPL").await.unwrap();
        assert_eq!(snapshot.provider, ProviderKind::Free);
        assert_eq!(snapshot.contracts[0].source, ProviderKind::Free);
        assert_eq!(calls(&primary_calls), 1, "auth failure must not be retried");
        assert_eq!(calls(&fallback_calls), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let flaky = MockProvider::with_chains(
            ProviderKind::Institutional,
            vec![
                Err(ProviderFailure::Network("connection reset".into())),
                Ok(chain("MSFT", ProviderKind::Institutional)),
            ],
        );
        let counter = flaky.call_counter();

        let mgr = manager(vec![Provider::Mock(flaky)], Duration::from_secs(60));
        let snapshot = mgr.get_option_chain("MSFT").await.unwrap();

        assert_eq!(snapshot.provider, ProviderKind::Institutional);
        assert_eq!(calls(&counter), 2, "one retry after the transient failure");
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_provider_calls() {
        let provider = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Ok(chain("SPY", ProviderKind::Free))],
        );
        let counter = provider.call_counter();

        let mgr = manager(vec![Provider::Mock(provider)], Duration::from_secs(60));
        mgr.get_option_chain("SPY").await.unwrap();
        mgr.get_option_chain("SPY").await.unwrap();

        assert_eq!(calls(&counter), 1, "second fetch must come from cache");
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let provider = MockProvider::with_chains(
            ProviderKind::Free,
            vec![
                Ok(chain("SPY", ProviderKind::Free)),
                Ok(chain("SPY", ProviderKind::Free)),
            ],
        );
        let counter = provider.call_counter();

        let mgr = manager(vec![Provider::Mock(provider)], Duration::from_millis(10));
        mgr.get_option_chain("SPY").await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        mgr.get_option_chain("SPY").await.unwrap();

        assert_eq!(calls(&counter), 2, "stale entry must trigger a re-fetch");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let provider = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Ok(chain("QQQ", ProviderKind::Free))],
        )
        .with_delay(Duration::from_millis(50));
        let counter = provider.call_counter();

        let mgr = Arc::new(manager(vec![Provider::Mock(provider)], Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move { mgr.get_option_chain("QQQ").await }));
        }
        for handle in handles {
            let snapshot = handle.await.unwrap().unwrap();
            assert_eq!(snapshot.underlying, "QQQ");
        }

        assert_eq!(calls(&counter), 1, "concurrent requests must share one fetch");
    }

    #[tokio::test]
    async fn test_empty_chain_falls_through() {
        let empty = MockProvider::with_chains(
            ProviderKind::Institutional,
            vec![Ok(empty_chain("XLE", ProviderKind::Institutional))],
        );
        let full = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Ok(chain("XLE", ProviderKind::Free))],
        );

        let mgr = manager(
            vec![Provider::Mock(empty), Provider::Mock(full)],
            Duration::from_secs(60),
        );
        let snapshot = mgr.get_option_chain("XLE").await.unwrap();
        assert_eq!(snapshot.provider, ProviderKind::Free, "empty chain is not trusted");
    }

    #[tokio::test]
    async fn test_all_failed_enumerates_attempts() {
        let a = MockProvider::with_chains(
            ProviderKind::Institutional,
            vec![Err(ProviderFailure::Unauthorized("bad key".into()))],
        );
        let b = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Err(ProviderFailure::NoData("nothing listed".into()))],
        );

        let mgr = manager(vec![Provider::Mock(a), Provider::Mock(b)], Duration::from_secs(60));
        let err = mgr.get_option_chain("TSLA").await.unwrap_err();

        match err.as_ref() {
            AcquisitionError::AllProvidersFailed { symbol, attempts } => {
                assert_eq!(symbol, "TSLA");
                assert_eq!(attempts.len(), 2);
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("unauthorized"));
        assert!(msg.contains("no data"));
    }

    #[tokio::test]
    async fn test_no_providers_configured() {
        let mgr = manager(vec![], Duration::from_secs(60));
        let err = mgr.get_option_chain("AAPL").await.unwrap_err();
        assert!(matches!(
            err.as_ref(),
            AcquisitionError::NoProvidersConfigured
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aborted_fetch_releases_inflight_key() {
        let provider = MockProvider::with_chains(
            ProviderKind::Free,
            vec![Ok(chain("QQQ", ProviderKind::Free))],
        )
        .with_delay(Duration::from_millis(200));
        let mgr = Arc::new(manager(vec![Provider::Mock(provider)], Duration::from_secs(60)));

        let leader = tokio::spawn({
            let mgr = Arc::clone(&mgr);
            async move { mgr.get_option_chain("QQQ").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.abort();
        let _ = leader.await;

        let second = tokio::time::timeout(Duration::from_secs(2), mgr.get_option_chain("QQQ"))
            .await
            .expect("fetch after an aborted leader must not hang");
        assert_eq!(second.unwrap().underlying, "QQQ");
    }

    #[tokio::test]
    async fn test_stale_provider_quote_falls_through() {
        let stale = Quote {
            symbol: "NVDA".into(),
            last: 130.4,
            timestamp: Utc::now() - chrono::Duration::hours(20),
            source: ProviderKind::Institutional,
        };
        let fresh = Quote {
            symbol: "NVDA".into(),
            last: 131.2,
            timestamp: Utc::now(),
            source: ProviderKind::Secondary,
        };
        let primary =
            MockProvider::with_quotes(ProviderKind::Institutional, vec![Ok(stale.clone())]);
        let secondary = MockProvider::with_quotes(ProviderKind::Secondary, vec![Ok(fresh)]);

        let mgr = manager(
            vec![Provider::Mock(primary), Provider::Mock(secondary)],
            Duration::from_secs(60),
        );
        let quote = mgr.get_quote("NVDA").await.unwrap();
        assert_eq!(quote.source, ProviderKind::Secondary, "stale quote must not be served");

        // With only the stale source, the symbol fails loudly.
        let only_stale =
            MockProvider::with_quotes(ProviderKind::Institutional, vec![Ok(stale)]);
        let mgr = manager(vec![Provider::Mock(only_stale)], Duration::from_secs(60));
        let err = mgr.get_quote("NVDA").await.unwrap_err();
        assert!(err.to_string().contains("freshness window"));
    }

    #[tokio::test]
    async fn test_quote_fallback_path() {
        let quote = Quote {
            symbol: "NVDA".into(),
            last: 131.2,
            timestamp: Utc::now(),
            source: ProviderKind::Secondary,
        };
        let dead = MockProvider::with_quotes(
            ProviderKind::Institutional,
            vec![Err(ProviderFailure::Unauthorized("no plan".into()))],
        );
        let live = MockProvider::with_quotes(ProviderKind::Secondary, vec![Ok(quote)]);

        let mgr = manager(
            vec![Provider::Mock(dead), Provider::Mock(live)],
            Duration::from_secs(60),
        );
        let quote = mgr.get_quote("NVDA").await.unwrap();
        assert_eq!(quote.source, ProviderKind::Secondary);
        assert_eq!(quote.last, 131.2);
    }
}
