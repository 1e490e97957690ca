//! Secondary adapter (Tiingo-style IEX quote feed).
//!
//! Serves underlying quotes only; it has no options endpoint, so chain
//! requests report `NoData` and the manager falls through. A local
//! hourly request budget is enforced before any network call so the
//! account never trips the provider-side limiter.

use crate::errors::ProviderFailure;
use crate::types::{ChainSnapshot, ProviderKind, Quote};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{ProviderUsage, UsageStats};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const BUDGET_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct BudgetWindow {
    started: Instant,
    used: u64,
}

#[derive(Debug)]
pub struct TiingoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    hourly_budget: u64,
    window: Mutex<BudgetWindow>,
    usage: ProviderUsage,
}

#[derive(Debug, Deserialize)]
struct IexQuote {
    #[serde(rename = "tngoLast")]
    tngo_last: Option<f64>,
    last: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

impl TiingoClient {
    pub fn new(api_key: String, base_url: String, hourly_budget: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
            hourly_budget,
            window: Mutex::new(BudgetWindow {
                started: Instant::now(),
                used: 0,
            }),
            usage: ProviderUsage::default(),
        }
    }

    /// Consume one request from the hourly budget, resetting the window
    /// when an hour has elapsed.
    fn take_budget(&self) -> Result<(), ProviderFailure> {
        let mut window = self.window.lock().expect("budget lock poisoned");
        if window.started.elapsed() >= BUDGET_WINDOW {
            window.started = Instant::now();
            window.used = 0;
        }
        if window.used >= self.hourly_budget {
            return Err(ProviderFailure::RateLimited {
                detail: format!("hourly budget of {} exhausted", self.hourly_budget),
                retry_after: Some(BUDGET_WINDOW.saturating_sub(window.started.elapsed())),
            });
        }
        window.used += 1;
        Ok(())
    }

    fn budget_remaining(&self) -> u64 {
        let window = self.window.lock().expect("budget lock poisoned");
        if window.started.elapsed() >= BUDGET_WINDOW {
            self.hourly_budget
        } else {
            self.hourly_budget.saturating_sub(window.used)
        }
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderFailure> {
        self.take_budget()?;
        self.usage.record_request();

        let url = format!(
            "{}/iex/?tickers={}&token={}",
            self.base_url, symbol, self.api_key
        );
        let resp = self.client.get(&url).send().await.map_err(|e| {
            self.usage.record_failure();
            ProviderFailure::from(e)
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            self.usage.record_failure();
            return Err(ProviderFailure::Unauthorized(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.usage.record_failure();
            return Err(ProviderFailure::RateLimited {
                detail: format!("HTTP {status}"),
                retry_after: None,
            });
        }
        if !status.is_success() {
            self.usage.record_failure();
            return Err(ProviderFailure::Network(format!("HTTP {status}")));
        }

        let quotes: Vec<IexQuote> = resp.json().await.map_err(|e| {
            self.usage.record_failure();
            ProviderFailure::MalformedSchema(e.to_string())
        })?;

        let quote = quotes
            .into_iter()
            .next()
            .ok_or_else(|| ProviderFailure::NoData(format!("no IEX quote for {symbol}")))?;

        let last = quote
            .tngo_last
            .or(quote.last)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderFailure::NoData(format!("IEX quote for {symbol} has no price")))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            last,
            timestamp: quote.timestamp.unwrap_or_else(Utc::now),
            source: ProviderKind::Secondary,
        })
    }

    pub async fn fetch_chain(&self, symbol: &str) -> Result<ChainSnapshot, ProviderFailure> {
        Err(ProviderFailure::NoData(format!(
            "secondary feed serves quotes only, no chain for {symbol}"
        )))
    }

    pub fn usage_stats(&self) -> UsageStats {
        UsageStats {
            provider: ProviderKind::Secondary,
            requests_used: self.usage.requests_used(),
            failures: self.usage.failures_seen(),
            budget_remaining: Some(self.budget_remaining()),
        }
    }
}
