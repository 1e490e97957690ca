use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Provenance ──

/// Which data source produced a quote or chain. Priority order is
/// configuration, never hardcoded in business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Institutional feed (Polygon-style snapshot API).
    Institutional,
    /// Secondary feed (Tiingo-style, quotes only).
    Secondary,
    /// Free fallback feed (Yahoo-style unofficial API).
    Free,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Institutional => "institutional",
            ProviderKind::Secondary => "secondary",
            ProviderKind::Free => "free",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "institutional" => Some(ProviderKind::Institutional),
            "secondary" => Some(ProviderKind::Secondary),
            "free" => Some(ProviderKind::Free),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of payload a cache entry or fetch refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Quote,
    OptionChain,
}

// ── Market data ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    #[inline]
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying spot quote. Created fresh per screening run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last: f64,
    pub timestamp: DateTime<Utc>,
    pub source: ProviderKind,
}

impl Quote {
    /// Age of the quote relative to now.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.timestamp
    }
}

/// One option contract as reported by a provider. Missing fields stay
/// `None`; nothing is zero-filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: String,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    /// Implied volatility as reported by the provider. Never solved for
    /// or invented here.
    pub implied_vol: Option<f64>,
    pub open_interest: Option<u64>,
    pub volume: Option<u64>,
    pub source: ProviderKind,
}

impl OptionContract {
    /// Mid price when both sides of the book are present.
    #[inline]
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Market price for edge computation: mid when both sides quote,
    /// else the last trade.
    #[inline]
    pub fn market_price(&self) -> Option<f64> {
        self.mid().or(self.last.filter(|p| *p > 0.0))
    }

    /// Bid-ask spread.
    #[inline]
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Spread relative to mid. Comparable across underlyings of
    /// different price magnitude.
    pub fn relative_spread(&self) -> Option<f64> {
        match (self.spread(), self.mid()) {
            (Some(s), Some(m)) if m > 0.0 => Some(s / m),
            _ => None,
        }
    }

    /// Calendar days until expiry from `today`. Negative when expired.
    #[inline]
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry - today).num_days()
    }

    /// Moneyness = spot / strike.
    #[inline]
    pub fn moneyness(&self, spot: f64) -> f64 {
        spot / self.strike
    }

    /// Invariant check: bid must not exceed ask when both quote.
    /// Contracts violating this are dropped at the adapter boundary.
    #[inline]
    pub fn quote_consistent(&self) -> bool {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => b <= a,
            _ => true,
        }
    }
}

/// A normalized option chain from one provider, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub underlying: String,
    pub underlying_price: f64,
    pub contracts: Vec<OptionContract>,
    pub provider: ProviderKind,
    pub fetched_at: DateTime<Utc>,
}

impl ChainSnapshot {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

// ── Computed data ──

/// Closed-form sensitivities. Theta is per calendar day, vega per 1%
/// vol move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// Output of the pricing engine for one contract. Only constructed when
/// every real input was available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub theoretical_value: f64,
    pub greeks: Greeks,
    /// Market price used for the edge (mid, else last trade).
    pub market_price: f64,
    /// Theoretical value minus market price. Positive means the market
    /// appears to undervalue the option relative to the model.
    pub edge: f64,
    /// Edge as a percentage of the market price.
    pub edge_pct: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub moneyness: f64,
    pub days_to_expiry: i64,
    pub time_years: f64,
}

/// Contract enriched with model value, Greeks, edge and liquidity.
/// Attached as a new value; the source contract is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedContract {
    pub contract: OptionContract,
    pub underlying_price: f64,
    pub valuation: Valuation,
    /// Bounded [0,1] liquidity score.
    pub liquidity_score: f64,
}

impl PricedContract {
    pub fn new(
        contract: OptionContract,
        underlying_price: f64,
        valuation: Valuation,
        liquidity_score: f64,
    ) -> Self {
        Self {
            contract,
            underlying_price,
            valuation,
            liquidity_score,
        }
    }

    #[inline]
    pub fn open_interest(&self) -> u64 {
        self.contract.open_interest.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(bid: Option<f64>, ask: Option<f64>, last: Option<f64>) -> OptionContract {
        OptionContract {
            underlying: "AAPL".into(),
            strike: 200.0,
            expiry: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            option_type: OptionType::Call,
            bid,
            ask,
            last,
            implied_vol: Some(0.3),
            open_interest: Some(500),
            volume: Some(20),
            source: ProviderKind::Free,
        }
    }

    #[test]
    fn test_mid_requires_both_sides() {
        assert_eq!(contract(Some(10.0), Some(10.5), None).mid(), Some(10.25));
        assert_eq!(contract(Some(10.0), None, Some(9.0)).mid(), None);
        assert_eq!(contract(None, None, Some(9.0)).mid(), None);
    }

    #[test]
    fn test_market_price_falls_back_to_last() {
        assert_eq!(contract(None, None, Some(9.0)).market_price(), Some(9.0));
        assert_eq!(contract(None, None, None).market_price(), None);
        // mid wins over last
        assert_eq!(
            contract(Some(10.0), Some(11.0), Some(9.0)).market_price(),
            Some(10.5)
        );
    }

    #[test]
    fn test_quote_consistency() {
        assert!(contract(Some(10.0), Some(10.5), None).quote_consistent());
        assert!(!contract(Some(11.0), Some(10.0), None).quote_consistent());
        // one-sided quotes are not a violation
        assert!(contract(Some(10.0), None, None).quote_consistent());
    }

    #[test]
    fn test_relative_spread() {
        let c = contract(Some(9.5), Some(10.5), None);
        let rs = c.relative_spread().unwrap();
        assert!((rs - 0.1).abs() < 1e-12, "relative spread {rs} should be 0.1");
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(
            ProviderKind::parse(" Institutional "),
            Some(ProviderKind::Institutional)
        );
        assert_eq!(ProviderKind::parse("free"), Some(ProviderKind::Free));
        assert_eq!(ProviderKind::parse("bloomberg"), None);
    }
}
