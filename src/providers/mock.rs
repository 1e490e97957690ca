//! Scripted provider used by acquisition and pipeline tests.

use crate::errors::ProviderFailure;
use crate::types::{ChainSnapshot, ProviderKind, Quote};
use portable_atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::UsageStats;

type ChainOutcome = Result<ChainSnapshot, ProviderFailure>;
type QuoteOutcome = Result<Quote, ProviderFailure>;

/// Replays a queue of outcomes in order, counting calls. Once the
/// script runs out it reports `NoData`.
#[derive(Debug)]
pub struct MockProvider {
    pub kind: ProviderKind,
    chain_script: Mutex<VecDeque<ChainOutcome>>,
    quote_script: Mutex<VecDeque<QuoteOutcome>>,
    /// Delay before answering, to widen single-flight race windows.
    pub delay: Duration,
    calls: Arc<AtomicU64>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            chain_script: Mutex::new(VecDeque::new()),
            quote_script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_chains(kind: ProviderKind, outcomes: Vec<ChainOutcome>) -> Self {
        let mock = Self::new(kind);
        mock.chain_script
            .lock()
            .expect("script lock poisoned")
            .extend(outcomes);
        mock
    }

    pub fn with_quotes(kind: ProviderKind, outcomes: Vec<QuoteOutcome>) -> Self {
        let mock = Self::new(kind);
        mock.quote_script
            .lock()
            .expect("script lock poisoned")
            .extend(outcomes);
        mock
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared handle to the call counter, usable after the provider has
    /// been moved into a manager.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }

    pub async fn fetch_chain(&self, symbol: &str) -> ChainOutcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.chain_script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderFailure::NoData(format!(
                    "script exhausted for {symbol}"
                )))
            })
    }

    pub async fn fetch_quote(&self, symbol: &str) -> QuoteOutcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.quote_script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderFailure::NoData(format!(
                    "script exhausted for {symbol}"
                )))
            })
    }

    pub fn usage_stats(&self) -> UsageStats {
        UsageStats {
            provider: self.kind,
            requests_used: self.calls.load(Ordering::Relaxed),
            failures: 0,
            budget_remaining: None,
        }
    }
}
