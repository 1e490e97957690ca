use crate::errors::ConfigError;
use crate::types::ProviderKind;
use std::time::Duration;

/// Inclusive threshold bands for the screening filter. A contract must
/// satisfy every band to survive.
#[derive(Debug, Clone, Copy)]
pub struct ScreenBands {
    /// Contracts must have at least this many calendar days to expiry.
    /// 365 is the LEAP floor.
    pub min_days_to_expiry: i64,
    pub min_moneyness: f64,
    pub max_moneyness: f64,
    pub min_delta: f64,
    pub max_delta: f64,
    pub min_implied_vol: f64,
    pub max_implied_vol: f64,
    pub min_liquidity_score: f64,
}

impl Default for ScreenBands {
    fn default() -> Self {
        Self {
            min_days_to_expiry: 365,
            min_moneyness: 0.8,
            max_moneyness: 1.2,
            min_delta: 0.3,
            max_delta: 0.8,
            min_implied_vol: 0.15,
            max_implied_vol: 0.60,
            min_liquidity_score: 0.10,
        }
    }
}

/// Liquidity score weights and reference scales. Each raw factor is
/// normalized against its reference so scores are comparable across
/// underlyings of different price magnitude.
#[derive(Debug, Clone, Copy)]
pub struct LiquidityConfig {
    pub volume_weight: f64,
    pub open_interest_weight: f64,
    pub spread_weight: f64,
    /// Daily volume that earns the full volume component.
    pub volume_ref: f64,
    /// Open interest that earns the full open-interest component.
    pub open_interest_ref: f64,
    /// Relative spread at or above which the spread component is zero.
    pub max_relative_spread: f64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            volume_weight: 0.4,
            open_interest_weight: 0.4,
            spread_weight: 0.2,
            volume_ref: 20.0,
            open_interest_ref: 4000.0,
            max_relative_spread: 0.15,
        }
    }
}

/// Composite ranking weights. Exposed as configuration rather than a
/// fixed formula.
#[derive(Debug, Clone, Copy)]
pub struct RankingConfig {
    pub edge_weight: f64,
    pub liquidity_weight: f64,
    pub risk_weight: f64,
    /// How hard daily time decay is penalized relative to delta in the
    /// risk-adjustment term.
    pub theta_penalty: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            edge_weight: 0.5,
            liquidity_weight: 0.3,
            risk_weight: 0.2,
            theta_penalty: 1.0,
        }
    }
}

/// Full screener configuration: provider credentials and priority,
/// cache freshness, retry policy, bands and weights.
#[derive(Debug, Clone)]
pub struct ScreenerConfig {
    pub polygon_api_key: Option<String>,
    pub polygon_base_url: String,
    pub tiingo_api_key: Option<String>,
    pub tiingo_base_url: String,
    pub yahoo_base_url: String,
    /// Adapter order for the fallback chain.
    pub provider_priority: Vec<ProviderKind>,
    /// Local hourly request budget for the secondary feed.
    pub secondary_hourly_budget: u64,
    pub quote_ttl: Duration,
    pub chain_ttl: Duration,
    /// Backoff before the single retry of a transient provider failure.
    pub retry_backoff: Duration,
    pub max_concurrent_symbols: usize,
    /// Per-symbol cap on expiry dates fetched from the free feed, which
    /// needs one request per expiry.
    pub chain_max_expiries: usize,
    /// Expiries closer than this are not worth a free-feed request for a
    /// LEAP screen.
    pub chain_min_days: i64,
    pub bands: ScreenBands,
    pub liquidity: LiquidityConfig,
    pub ranking: RankingConfig,
    pub top_k: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            polygon_api_key: None,
            polygon_base_url: "https://api.polygon.io".into(),
            tiingo_api_key: None,
            tiingo_base_url: "https://api.tiingo.com".into(),
            yahoo_base_url: "https://query1.finance.yahoo.com/v7/finance".into(),
            provider_priority: vec![
                ProviderKind::Institutional,
                ProviderKind::Secondary,
                ProviderKind::Free,
            ],
            secondary_hourly_budget: 50,
            quote_ttl: Duration::from_secs(15 * 60),
            chain_ttl: Duration::from_secs(60 * 60),
            retry_backoff: Duration::from_millis(500),
            max_concurrent_symbols: 4,
            chain_max_expiries: 3,
            chain_min_days: 300,
            bands: ScreenBands::default(),
            liquidity: LiquidityConfig::default(),
            ranking: RankingConfig::default(),
            top_k: 10,
        }
    }
}

impl ScreenerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let provider_priority = match std::env::var("PROVIDER_PRIORITY") {
            Ok(raw) => parse_priority(&raw)?,
            Err(_) => defaults.provider_priority,
        };

        let cfg = Self {
            polygon_api_key: env_var_opt("POLYGON_API_KEY"),
            polygon_base_url: env_var_or("POLYGON_BASE_URL", &defaults.polygon_base_url),
            tiingo_api_key: env_var_opt("TIINGO_API_KEY"),
            tiingo_base_url: env_var_or("TIINGO_BASE_URL", &defaults.tiingo_base_url),
            yahoo_base_url: env_var_or("YAHOO_BASE_URL", &defaults.yahoo_base_url),
            provider_priority,
            secondary_hourly_budget: parse_env("SECONDARY_HOURLY_BUDGET", 50u64)?,
            quote_ttl: Duration::from_secs(parse_env("QUOTE_TTL_SECS", 15 * 60u64)?),
            chain_ttl: Duration::from_secs(parse_env("CHAIN_TTL_SECS", 60 * 60u64)?),
            retry_backoff: Duration::from_millis(parse_env("RETRY_BACKOFF_MS", 500u64)?),
            max_concurrent_symbols: parse_env("MAX_CONCURRENT_SYMBOLS", 4usize)?,
            chain_max_expiries: parse_env("CHAIN_MAX_EXPIRIES", 3usize)?,
            chain_min_days: parse_env("CHAIN_MIN_DAYS", 300i64)?,
            bands: ScreenBands {
                min_days_to_expiry: parse_env("MIN_DAYS_TO_EXPIRY", 365i64)?,
                min_moneyness: parse_env("MIN_MONEYNESS", 0.8f64)?,
                max_moneyness: parse_env("MAX_MONEYNESS", 1.2f64)?,
                min_delta: parse_env("MIN_DELTA", 0.3f64)?,
                max_delta: parse_env("MAX_DELTA", 0.8f64)?,
                min_implied_vol: parse_env("MIN_IMPLIED_VOL", 0.15f64)?,
                max_implied_vol: parse_env("MAX_IMPLIED_VOL", 0.60f64)?,
                min_liquidity_score: parse_env("MIN_LIQUIDITY_SCORE", 0.10f64)?,
            },
            liquidity: LiquidityConfig {
                volume_weight: parse_env("LIQ_VOLUME_WEIGHT", 0.4f64)?,
                open_interest_weight: parse_env("LIQ_OI_WEIGHT", 0.4f64)?,
                spread_weight: parse_env("LIQ_SPREAD_WEIGHT", 0.2f64)?,
                volume_ref: parse_env("LIQ_VOLUME_REF", 20.0f64)?,
                open_interest_ref: parse_env("LIQ_OI_REF", 4000.0f64)?,
                max_relative_spread: parse_env("LIQ_MAX_REL_SPREAD", 0.15f64)?,
            },
            ranking: RankingConfig {
                edge_weight: parse_env("RANK_EDGE_WEIGHT", 0.5f64)?,
                liquidity_weight: parse_env("RANK_LIQUIDITY_WEIGHT", 0.3f64)?,
                risk_weight: parse_env("RANK_RISK_WEIGHT", 0.2f64)?,
                theta_penalty: parse_env("RANK_THETA_PENALTY", 1.0f64)?,
            },
            top_k: parse_env("TOP_K", 10usize)?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot describe a valid screen.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_priority.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "PROVIDER_PRIORITY".into(),
                detail: "priority list is empty".into(),
            });
        }

        let b = &self.bands;
        check_band("moneyness", b.min_moneyness, b.max_moneyness)?;
        check_band("delta", b.min_delta, b.max_delta)?;
        check_band("implied_vol", b.min_implied_vol, b.max_implied_vol)?;
        if b.min_days_to_expiry < 0 {
            return Err(ConfigError::InvalidBand {
                name: "days_to_expiry",
                detail: format!("floor {} is negative", b.min_days_to_expiry),
            });
        }
        if !(0.0..=1.0).contains(&b.min_liquidity_score) {
            return Err(ConfigError::InvalidBand {
                name: "liquidity_score",
                detail: format!("minimum {} outside [0,1]", b.min_liquidity_score),
            });
        }

        let l = &self.liquidity;
        for (name, v) in [
            ("LIQ_VOLUME_REF", l.volume_ref),
            ("LIQ_OI_REF", l.open_interest_ref),
            ("LIQ_MAX_REL_SPREAD", l.max_relative_spread),
        ] {
            if v <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: name.into(),
                    detail: format!("{v} must be positive"),
                });
            }
        }
        for (name, v) in [
            ("LIQ_VOLUME_WEIGHT", l.volume_weight),
            ("LIQ_OI_WEIGHT", l.open_interest_weight),
            ("LIQ_SPREAD_WEIGHT", l.spread_weight),
            ("RANK_EDGE_WEIGHT", self.ranking.edge_weight),
            ("RANK_LIQUIDITY_WEIGHT", self.ranking.liquidity_weight),
            ("RANK_RISK_WEIGHT", self.ranking.risk_weight),
            ("RANK_THETA_PENALTY", self.ranking.theta_penalty),
        ] {
            if v < 0.0 || !v.is_finite() {
                return Err(ConfigError::InvalidValue {
                    key: name.into(),
                    detail: format!("{v} must be finite and non-negative"),
                });
            }
        }

        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOP_K".into(),
                detail: "must be at least 1".into(),
            });
        }
        if self.max_concurrent_symbols == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_CONCURRENT_SYMBOLS".into(),
                detail: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

fn check_band(name: &'static str, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(ConfigError::InvalidBand {
            name,
            detail: format!("[{lo}, {hi}] is not a valid inclusive range"),
        });
    }
    Ok(())
}

fn parse_priority(raw: &str) -> Result<Vec<ProviderKind>, ConfigError> {
    let mut order = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let kind = ProviderKind::parse(part).ok_or_else(|| ConfigError::InvalidValue {
            key: "PROVIDER_PRIORITY".into(),
            detail: format!("unknown provider {part:?}"),
        })?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    Ok(order)
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.into(),
            detail: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ScreenerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let mut cfg = ScreenerConfig::default();
        cfg.bands.min_delta = 0.9;
        cfg.bands.max_delta = 0.3;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBand { name: "delta", .. })
        ));
    }

    #[test]
    fn test_empty_priority_rejected() {
        let mut cfg = ScreenerConfig::default();
        cfg.provider_priority.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_priority_dedupes_and_orders() {
        let order = parse_priority("free, institutional,free").unwrap();
        assert_eq!(
            order,
            vec![ProviderKind::Free, ProviderKind::Institutional]
        );
        assert!(parse_priority("free,teletext").is_err());
    }

    #[test]
    fn test_nonpositive_reference_rejected() {
        let mut cfg = ScreenerConfig::default();
        cfg.liquidity.volume_ref = 0.0;
        assert!(cfg.validate().is_err());
    }
}
