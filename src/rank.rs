//! Multi-factor ranking of screened contracts.
//!
//! Composite score = edge weight x edge fraction + liquidity weight x
//! liquidity score + risk weight x risk adjustment, where the risk
//! adjustment rewards directional exposure and penalizes daily time
//! decay relative to the contract price. Weights are configuration
//! constants, not a fixed formula.

use crate::config::RankingConfig;
use crate::types::PricedContract;
use serde::Serialize;
use std::cmp::Ordering;

/// A priced contract with its composite rank score attached.
#[derive(Debug, Clone, Serialize)]
pub struct RankedContract {
    pub contract: PricedContract,
    pub composite_score: f64,
}

/// Risk-adjustment term: delta magnitude minus the penalized fraction
/// of price lost to one day of decay.
#[inline]
fn risk_adjustment(p: &PricedContract, cfg: &RankingConfig) -> f64 {
    let v = &p.valuation;
    v.greeks.delta.abs() - cfg.theta_penalty * v.greeks.theta.abs() / v.market_price
}

/// Pure function of the contract's computed fields and the weights.
pub fn composite_score(p: &PricedContract, cfg: &RankingConfig) -> f64 {
    let edge_fraction = p.valuation.edge_pct / 100.0;
    cfg.edge_weight * edge_fraction
        + cfg.liquidity_weight * p.liquidity_score
        + cfg.risk_weight * risk_adjustment(p, cfg)
}

/// Descending composite order; ties broken by higher open interest,
/// then by nearer expiry. Total and reproducible.
fn compare(a: &RankedContract, b: &RankedContract) -> Ordering {
    b.composite_score
        .partial_cmp(&a.composite_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.contract.open_interest().cmp(&a.contract.open_interest()))
        .then_with(|| a.contract.contract.expiry.cmp(&b.contract.contract.expiry))
}

/// Score and totally order the surviving contracts.
pub fn rank(passed: Vec<PricedContract>, cfg: &RankingConfig) -> Vec<RankedContract> {
    let mut ranked: Vec<RankedContract> = passed
        .into_iter()
        .map(|contract| {
            let composite_score = composite_score(&contract, cfg);
            RankedContract {
                contract,
                composite_score,
            }
        })
        .collect();

    ranked.sort_by(compare);
    ranked
}

/// First K of the ranked set (the full set stays available for export).
pub fn top_k(ranked: &[RankedContract], k: usize) -> &[RankedContract] {
    &ranked[..k.min(ranked.len())]
}
