//! Institutional-grade adapter (Polygon-style snapshot API).
//!
//! Chains come from the options snapshot endpoint, which reports quotes,
//! day volume, open interest and implied volatility in one response.
//! Provider-computed greeks in the payload are ignored; the pricing
//! engine derives its own from the reported IV.

use crate::errors::ProviderFailure;
use crate::types::{ChainSnapshot, OptionContract, OptionType, ProviderKind, Quote};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{drop_inconsistent, ProviderUsage, UsageStats};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const SNAPSHOT_PAGE_LIMIT: u32 = 250;
const SNAPSHOT_PAGE_CAP: usize = 8;

#[derive(Debug)]
pub struct PolygonClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    usage: ProviderUsage,
}

// ── Wire schemas ──

#[derive(Debug, Deserialize)]
struct PrevCloseResponse {
    results: Option<Vec<PrevCloseBar>>,
}

#[derive(Debug, Deserialize)]
struct PrevCloseBar {
    /// Close price.
    c: Option<f64>,
    /// Bar end timestamp, Unix millis.
    t: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    results: Option<Vec<ContractSnapshot>>,
    /// Continuation cursor for chains larger than one page.
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContractSnapshot {
    details: Option<ContractDetails>,
    last_quote: Option<SnapshotQuote>,
    last_trade: Option<SnapshotTrade>,
    day: Option<SnapshotDay>,
    open_interest: Option<u64>,
    implied_volatility: Option<f64>,
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Deserialize)]
struct ContractDetails {
    strike_price: Option<f64>,
    expiration_date: Option<String>,
    contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotQuote {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotTrade {
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDay {
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UnderlyingAsset {
    price: Option<f64>,
}

impl PolygonClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
            usage: ProviderUsage::default(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderFailure> {
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
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderFailure::RateLimited {
                detail: format!("HTTP {status}"),
                retry_after,
            });
        }
        if !status.is_success() {
            self.usage.record_failure();
            return Err(ProviderFailure::Network(format!("HTTP {status}")));
        }

        resp.json::<T>().await.map_err(|e| {
            self.usage.record_failure();
            ProviderFailure::MalformedSchema(e.to_string())
        })
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderFailure> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/prev?adjusted=true&apiKey={}",
            self.base_url, symbol, self.api_key
        );
        let body: PrevCloseResponse = self.get_json(&url).await?;

        let bar = body
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ProviderFailure::NoData(format!("no prior close for {symbol}")))?;

        let last = bar
            .c
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderFailure::MalformedSchema("prior close missing price".into()))?;

        let timestamp = bar
            .t
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(Quote {
            symbol: symbol.to_string(),
            last,
            timestamp,
            source: ProviderKind::Institutional,
        })
    }

    pub async fn fetch_chain(&self, symbol: &str) -> Result<ChainSnapshot, ProviderFailure> {
        let mut url = format!(
            "{}/v3/snapshot/options/{}?limit={}&apiKey={}",
            self.base_url, symbol, SNAPSHOT_PAGE_LIMIT, self.api_key
        );
        let mut snapshots = Vec::new();
        for page in 1.. {
            let body: SnapshotResponse = self.get_json(&url).await?;
            snapshots.extend(body.results.unwrap_or_default());
            match body.next_url {
                None => break,
                Some(next) if page < SNAPSHOT_PAGE_CAP => {
                    // The cursor URL comes back without the key.
                    url = format!("{next}&apiKey={}", self.api_key);
                }
                Some(_) => {
                    tracing::warn!(
                        symbol = %symbol,
                        pages = page,
                        "snapshot page cap reached, chain truncated"
                    );
                    break;
                }
            }
        }
        if snapshots.is_empty() {
            return Err(ProviderFailure::NoData(format!(
                "empty option snapshot for {symbol}"
            )));
        }

        let mut underlying_price = snapshots
            .iter()
            .find_map(|s| s.underlying_asset.as_ref().and_then(|u| u.price))
            .filter(|p| *p > 0.0);

        let mut contracts = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            match normalize_snapshot(symbol, snapshot) {
                Some(contract) => contracts.push(contract),
                None => {
                    tracing::debug!(symbol = %symbol, "skipping snapshot with incomplete details");
                }
            }
        }

        // Snapshot payloads occasionally omit the underlying price; a
        // separate quote request fills it rather than defaulting.
        if underlying_price.is_none() {
            underlying_price = Some(self.fetch_quote(symbol).await?.last);
        }
        let underlying_price = underlying_price
            .ok_or_else(|| ProviderFailure::MalformedSchema("no underlying price".into()))?;

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
            provider: ProviderKind::Institutional,
            fetched_at: Utc::now(),
        })
    }

    pub fn usage_stats(&self) -> UsageStats {
        UsageStats {
            provider: ProviderKind::Institutional,
            requests_used: self.usage.requests_used(),
            failures: self.usage.failures_seen(),
            budget_remaining: None,
        }
    }
}

fn normalize_snapshot(symbol: &str, s: ContractSnapshot) -> Option<OptionContract> {
    let details = s.details?;
    let strike = details.strike_price.filter(|k| *k > 0.0)?;
    let expiry = details
        .expiration_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())?;
    let option_type = match details.contract_type.as_deref() {
        Some("call") => OptionType::Call,
        Some("put") => OptionType::Put,
        _ => return None,
    };

    Some(OptionContract {
        underlying: symbol.to_string(),
        strike,
        expiry,
        option_type,
        bid: s.last_quote.as_ref().and_then(|q| q.bid).filter(|p| *p > 0.0),
        ask: s.last_quote.as_ref().and_then(|q| q.ask).filter(|p| *p > 0.0),
        last: s.last_trade.as_ref().and_then(|t| t.price).filter(|p| *p > 0.0),
        implied_vol: s.implied_volatility.filter(|v| *v > 0.0),
        open_interest: s.open_interest,
        volume: s.day.as_ref().and_then(|d| d.volume).map(|v| v as u64),
        source: ProviderKind::Institutional,
    })
}
