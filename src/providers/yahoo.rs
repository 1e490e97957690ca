//! Free fallback adapter (Yahoo-style unofficial option chain API).
//!
//! One request lists expiration dates and the spot price; each selected
//! expiry is then fetched individually. Expiries are filtered to the
//! long-dated window up front so a chain fetch costs at most
//! `1 + max_expiries` requests.

use crate::errors::ProviderFailure;
use crate::types::{ChainSnapshot, OptionContract, OptionType, ProviderKind, Quote};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{drop_inconsistent, ProviderUsage, UsageStats};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
// The endpoint rejects default reqwest user agents.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

#[derive(Debug)]
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
    max_expiries: usize,
    min_days: i64,
    usage: ProviderUsage,
}

// ── Wire schemas ──

#[derive(Debug, Deserialize)]
struct OptionChainEnvelope {
    #[serde(rename = "optionChain")]
    option_chain: OptionChainBody,
}

#[derive(Debug, Deserialize)]
struct OptionChainBody {
    result: Vec<OptionChainResult>,
}

#[derive(Debug, Deserialize)]
struct OptionChainResult {
    quote: Option<UnderlyingQuote>,
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<ExpirySlice>,
}

#[derive(Debug, Deserialize)]
struct UnderlyingQuote {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketTime")]
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ExpirySlice {
    #[serde(default)]
    calls: Vec<RawOption>,
    #[serde(default)]
    puts: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    strike: Option<f64>,
    expiration: Option<i64>,
    bid: Option<f64>,
    ask: Option<f64>,
    #[serde(rename = "lastPrice")]
    last_price: Option<f64>,
    volume: Option<u64>,
    #[serde(rename = "openInterest")]
    open_interest: Option<u64>,
    #[serde(rename = "impliedVolatility")]
    implied_volatility: Option<f64>,
}

impl YahooClient {
    pub fn new(base_url: String, max_expiries: usize, min_days: i64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            max_expiries,
            min_days,
            usage: ProviderUsage::default(),
        }
    }

    async fn get_chain_page(&self, url: &str) -> Result<OptionChainResult, ProviderFailure> {
        self.usage.record_request();

        let resp = self.client.get(url).send().await.map_err(|e| {
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

        let envelope: OptionChainEnvelope = resp.json().await.map_err(|e| {
            self.usage.record_failure();
            ProviderFailure::MalformedSchema(e.to_string())
        })?;

        envelope
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderFailure::NoData("empty option chain result".into()))
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderFailure> {
        let url = format!("{}/options/{}", self.base_url, symbol);
        let page = self.get_chain_page(&url).await?;

        let quote = page
            .quote
            .ok_or_else(|| ProviderFailure::NoData(format!("no quote for {symbol}")))?;
        let last = quote
            .regular_market_price
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderFailure::NoData(format!("no market price for {symbol}")))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            last,
            timestamp: quote
                .regular_market_time
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
            source: ProviderKind::Free,
        })
    }

    pub async fn fetch_chain(&self, symbol: &str) -> Result<ChainSnapshot, ProviderFailure> {
        let index_url = format!("{}/options/{}", self.base_url, symbol);
        let index = self.get_chain_page(&index_url).await?;

        let underlying_price = index
            .quote
            .as_ref()
            .and_then(|q| q.regular_market_price)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| {
                ProviderFailure::MalformedSchema(format!("no underlying price for {symbol}"))
            })?;

        let today = Utc::now().date_naive();
        let selected: Vec<i64> = index
            .expiration_dates
            .iter()
            .copied()
            .filter(|ts| {
                DateTime::<Utc>::from_timestamp(*ts, 0)
                    .map(|d| (d.date_naive() - today).num_days() >= self.min_days)
                    .unwrap_or(false)
            })
            .take(self.max_expiries)
            .collect();

        if selected.is_empty() {
            return Err(ProviderFailure::NoData(format!(
                "no expiries at least {} days out for {symbol}",
                self.min_days
            )));
        }

        let mut contracts = Vec::new();
        for expiry_ts in selected {
            let url = format!("{}/options/{}?date={}", self.base_url, symbol, expiry_ts);
            match self.get_chain_page(&url).await {
                Ok(page) => {
                    for slice in page.options {
                        collect_contracts(symbol, &slice.calls, OptionType::Call, &mut contracts);
                        collect_contracts(symbol, &slice.puts, OptionType::Put, &mut contracts);
                    }
                }
                Err(failure) => {
                    // One bad expiry page does not sink the chain.
                    tracing::warn!(
                        symbol = %symbol,
                        expiry_ts,
                        error = %failure,
                        "skipping option expiry page"
                    );
                }
            }
        }

        let contracts = drop_inconsistent(symbol, contracts);
        if contracts.is_empty() {
            return Err(ProviderFailure::NoData(format!(
                "no usable contracts for {symbol}"
            )));
        }

        Ok(ChainSnapshot {
            underlying: symbol.to_string(),
            underlying_price,
            contracts,
            provider: ProviderKind::Free,
            fetched_at: Utc::now(),
        })
    }

    pub fn usage_stats(&self) -> UsageStats {
        UsageStats {
            provider: ProviderKind::Free,
            requests_used: self.usage.requests_used(),
            failures: self.usage.failures_seen(),
            budget_remaining: None,
        }
    }
}

fn collect_contracts(
    symbol: &str,
    raw: &[RawOption],
    option_type: OptionType,
    out: &mut Vec<OptionContract>,
) {
    for option in raw {
        let Some(strike) = option.strike.filter(|k| *k > 0.0) else {
            continue;
        };
        let Some(expiry) = option
            .expiration
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|d| d.date_naive())
        else {
            continue;
        };

        out.push(OptionContract {
            underlying: symbol.to_string(),
            strike,
            expiry,
            option_type,
            bid: option.bid.filter(|p| *p > 0.0),
            ask: option.ask.filter(|p| *p > 0.0),
            last: option.last_price.filter(|p| *p > 0.0),
            // The feed reports ~0 IV on stale contracts; that is absence.
            implied_vol: option.implied_volatility.filter(|v| *v > 1e-4),
            open_interest: option.open_interest,
            volume: option.volume,
            source: ProviderKind::Free,
        });
    }
}
