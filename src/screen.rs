//! Threshold screening over priced contracts.
//!
//! Each band is an inclusive range predicate; a contract failing any
//! band is dropped with the first failing predicate recorded so nothing
//! disappears silently.

use crate::config::ScreenBands;
use crate::types::PricedContract;

/// Why a contract was rejected by the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    ExpiryTooNear { days: i64 },
    MoneynessOutOfBand { value: f64 },
    DeltaOutOfBand { value: f64 },
    ImpliedVolOutOfBand { value: f64 },
    BelowMinimumLiquidity { score: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ExpiryTooNear { days } => write!(f, "expiry too near ({days} days)"),
            RejectReason::MoneynessOutOfBand { value } => {
                write!(f, "moneyness {value:.3} out of band")
            }
            RejectReason::DeltaOutOfBand { value } => write!(f, "delta {value:.3} out of band"),
            RejectReason::ImpliedVolOutOfBand { value } => {
                write!(f, "implied vol {value:.3} out of band")
            }
            RejectReason::BelowMinimumLiquidity { score } => {
                write!(f, "liquidity score {score:.3} below minimum")
            }
        }
    }
}

/// A rejected contract with its diagnostic reason.
#[derive(Debug, Clone)]
pub struct RejectedContract {
    pub contract: PricedContract,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct ScreenOutcome {
    pub passed: Vec<PricedContract>,
    pub rejected: Vec<RejectedContract>,
}

/// Check one contract against every band; `None` means it passes.
fn first_failing_band(p: &PricedContract, bands: &ScreenBands) -> Option<RejectReason> {
    let v = &p.valuation;

    if v.days_to_expiry < bands.min_days_to_expiry {
        return Some(RejectReason::ExpiryTooNear {
            days: v.days_to_expiry,
        });
    }
    if v.moneyness < bands.min_moneyness || v.moneyness > bands.max_moneyness {
        return Some(RejectReason::MoneynessOutOfBand { value: v.moneyness });
    }
    // Band is expressed on delta magnitude so the same range screens
    // puts and calls.
    let delta = v.greeks.delta.abs();
    if delta < bands.min_delta || delta > bands.max_delta {
        return Some(RejectReason::DeltaOutOfBand { value: v.greeks.delta });
    }
    // Pricing guarantees IV was present.
    if let Some(iv) = p.contract.implied_vol {
        if iv < bands.min_implied_vol || iv > bands.max_implied_vol {
            return Some(RejectReason::ImpliedVolOutOfBand { value: iv });
        }
    }
    if p.liquidity_score < bands.min_liquidity_score {
        return Some(RejectReason::BelowMinimumLiquidity {
            score: p.liquidity_score,
        });
    }

    None
}

/// Apply every band to the enriched set. Idempotent: screening an
/// already-screened set with the same bands returns the same set.
pub fn screen(contracts: Vec<PricedContract>, bands: &ScreenBands) -> ScreenOutcome {
    let mut outcome = ScreenOutcome::default();

    for contract in contracts {
        match first_failing_band(&contract, bands) {
            None => outcome.passed.push(contract),
            Some(reason) => {
                tracing::debug!(
                    underlying = %contract.contract.underlying,
                    strike = contract.contract.strike,
                    %reason,
                    "contract rejected by screen"
                );
                outcome.rejected.push(RejectedContract { contract, reason });
            }
        }
    }

    outcome
}
