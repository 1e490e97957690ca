//! Bounded [0,1] liquidity score.
//!
//! Weighted combination of daily volume, open interest, and relative
//! bid/ask spread, each normalized against a configurable reference
//! scale so scores compare across underlyings of different price
//! magnitude. A contract missing any required field receives no score
//! and is excluded from ranking rather than penalized with a default.

use crate::config::LiquidityConfig;
use crate::types::OptionContract;

/// Score a contract, or `None` when volume, open interest, or a
/// two-sided quote is missing.
pub fn score(contract: &OptionContract, cfg: &LiquidityConfig) -> Option<f64> {
    let volume = contract.volume? as f64;
    let open_interest = contract.open_interest? as f64;
    let relative_spread = contract.relative_spread()?;

    let volume_component = (volume / cfg.volume_ref).min(1.0);
    let oi_component = (open_interest / cfg.open_interest_ref).min(1.0);
    // Tighter spread scores higher; at or beyond the reference it is 0.
    let spread_component = (1.0 - relative_spread / cfg.max_relative_spread).clamp(0.0, 1.0);

    let total_weight = cfg.volume_weight + cfg.open_interest_weight + cfg.spread_weight;
    if total_weight <= 0.0 {
        return None;
    }

    let raw = cfg.volume_weight * volume_component
        + cfg.open_interest_weight * oi_component
        + cfg.spread_weight * spread_component;

    Some((raw / total_weight).clamp(0.0, 1.0))
}
