//! Freshness-window cache for provider results.
//!
//! Keyed by (symbol, data-kind). Entries are superseded by later
//! fetches, never mutated in place; stale entries are ignored and
//! evicted on access.

use crate::types::{ChainSnapshot, DataKind, Quote};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn quote(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: DataKind::Quote,
        }
    }

    pub fn chain(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: DataKind::OptionChain,
        }
    }
}

/// Cached provider payload. Chains sit behind an `Arc` so a hit never
/// copies the contract set.
#[derive(Debug, Clone)]
pub enum CachedPayload {
    Quote(Quote),
    Chain(Arc<ChainSnapshot>),
}

struct CacheEntry {
    payload: CachedPayload,
    fetched_at: Instant,
}

/// Shared read-mostly cache. Injected into the acquisition manager so
/// pricing and ranking stay testable in isolation; no ambient state.
pub struct MarketCache {
    quote_ttl: Duration,
    chain_ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MarketCache {
    pub fn new(quote_ttl: Duration, chain_ttl: Duration) -> Self {
        Self {
            quote_ttl,
            chain_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Freshness window applied to quotes, both in the cache and
    /// against provider-reported timestamps.
    pub fn quote_ttl(&self) -> Duration {
        self.quote_ttl
    }

    fn ttl_for(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Quote => self.quote_ttl,
            DataKind::OptionChain => self.chain_ttl,
        }
    }

    /// Fresh hit or nothing. A stale entry is evicted and reported as a
    /// miss so the caller re-fetches.
    pub fn get(&self, key: &CacheKey) -> Option<CachedPayload> {
        let ttl = self.ttl_for(key.kind);
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < ttl => {
                tracing::debug!(symbol = %key.symbol, kind = ?key.kind, "cache hit");
                Some(entry.payload.clone())
            }
            Some(_) => {
                tracing::debug!(symbol = %key.symbol, kind = ?key.kind, "cache entry stale");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a fresh entry, superseding any previous one.
    pub fn insert(&self, key: CacheKey, payload: CachedPayload) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key,
            CacheEntry {
                payload,
                fetched_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
