//! Closed-form option valuation and Greeks.
//!
//! Black-Scholes parameterized exclusively by real inputs: underlying
//! price, strike, calendar days to expiry / 365, the provider-reported
//! implied volatility, and an injected risk-free rate. There are no
//! default substitutions; any missing or non-positive input fails with
//! `PricingError::InvalidInput` and the contract is excluded downstream.
//!
//! Pure functions throughout: identical inputs produce bit-identical
//! outputs.

use crate::errors::PricingError;
use crate::types::{Greeks, OptionContract, OptionType, Valuation};
use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

#[inline]
fn norm_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

#[inline]
fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

#[inline]
fn d1(spot: f64, strike: f64, rate: f64, vol: f64, time: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * vol * vol) * time) / (vol * time.sqrt())
}

/// Black-Scholes European value. Callers must have validated
/// `time > 0` and `vol > 0`.
pub fn theoretical_value(
    spot: f64,
    strike: f64,
    rate: f64,
    vol: f64,
    time: f64,
    option_type: OptionType,
) -> f64 {
    let d1 = d1(spot, strike, rate, vol, time);
    let d2 = d1 - vol * time.sqrt();
    let df = (-rate * time).exp();

    match option_type {
        OptionType::Call => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionType::Put => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// Closed-form partial derivatives of the value. Theta is expressed as
/// decay per calendar day, vega per 1% vol move.
pub fn greeks(
    spot: f64,
    strike: f64,
    rate: f64,
    vol: f64,
    time: f64,
    option_type: OptionType,
) -> Greeks {
    let sqrt_t = time.sqrt();
    let d1 = d1(spot, strike, rate, vol, time);
    let d2 = d1 - vol * sqrt_t;
    let df = (-rate * time).exp();
    let pdf_d1 = norm_pdf(d1);

    let delta = match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    };

    let gamma = pdf_d1 / (spot * vol * sqrt_t);

    let vega = spot * pdf_d1 * sqrt_t / 100.0;

    let decay = -spot * pdf_d1 * vol / (2.0 * sqrt_t);
    let theta_annual = match option_type {
        OptionType::Call => decay - rate * strike * df * norm_cdf(d2),
        OptionType::Put => decay + rate * strike * df * norm_cdf(-d2),
    };

    Greeks {
        delta,
        gamma,
        theta: theta_annual / 365.0,
        vega,
    }
}

/// Validate a contract's real inputs and produce its valuation.
///
/// The rate is an injected input from a real reference source; a
/// non-finite or negative value is treated as unavailable and fails
/// loudly rather than defaulting.
pub fn value_contract(
    contract: &OptionContract,
    spot: f64,
    rate: f64,
    today: NaiveDate,
) -> Result<Valuation, PricingError> {
    if !spot.is_finite() || spot <= 0.0 {
        return Err(PricingError::invalid(format!(
            "non-positive underlying price {spot}"
        )));
    }
    if !contract.strike.is_finite() || contract.strike <= 0.0 {
        return Err(PricingError::invalid(format!(
            "non-positive strike {}",
            contract.strike
        )));
    }
    if !rate.is_finite() || rate < 0.0 {
        return Err(PricingError::invalid(format!(
            "risk-free rate unavailable or invalid ({rate})"
        )));
    }

    let days = contract.days_to_expiry(today);
    if days <= 0 {
        return Err(PricingError::invalid(format!(
            "non-positive time to expiry ({days} days)"
        )));
    }
    let time_years = days as f64 / 365.0;

    let vol = contract
        .implied_vol
        .ok_or_else(|| PricingError::invalid("missing implied volatility"))?;
    if !vol.is_finite() || vol <= 0.0 {
        return Err(PricingError::invalid(format!(
            "non-positive implied volatility {vol}"
        )));
    }

    let market_price = contract
        .market_price()
        .ok_or_else(|| PricingError::invalid("no bid/ask mid and no last trade"))?;

    let theoretical =
        theoretical_value(spot, contract.strike, rate, vol, time_years, contract.option_type);
    let greeks = greeks(spot, contract.strike, rate, vol, time_years, contract.option_type);

    let edge = theoretical - market_price;
    let intrinsic = contract.option_type.intrinsic(spot, contract.strike);

    Ok(Valuation {
        theoretical_value: theoretical,
        greeks,
        market_price,
        edge,
        edge_pct: edge / market_price * 100.0,
        intrinsic_value: intrinsic,
        time_value: (market_price - intrinsic).max(0.0),
        moneyness: contract.moneyness(spot),
        days_to_expiry: days,
        time_years,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use chrono::NaiveDate;

    fn leap(iv: Option<f64>, bid: Option<f64>, ask: Option<f64>) -> OptionContract {
        OptionContract {
            underlying: "SPY".into(),
            strike: 100.0,
            expiry: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            option_type: OptionType::Call,
            bid,
            ask,
            last: None,
            implied_vol: iv,
            open_interest: Some(1000),
            volume: Some(50),
            source: ProviderKind::Free,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_worked_example_atm_call() {
        // S=100, K=100, T=1y, vol=20%, r=5% -> C ~= 10.45, delta ~= 0.64
        let value = theoretical_value(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Call);
        assert!(
            (value - 10.45).abs() < 0.05,
            "call value {value} should be ~10.45"
        );

        let g = greeks(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Call);
        assert!((g.delta - 0.64).abs() < 0.01, "delta {} should be ~0.64", g.delta);
    }

    #[test]
    fn test_put_call_parity() {
        let (s, k, r, v, t) = (105.0, 100.0, 0.04, 0.25, 1.3);
        let call = theoretical_value(s, k, r, v, t, OptionType::Call);
        let put = theoretical_value(s, k, r, v, t, OptionType::Put);
        // C - P = S - K * e^{-rT}
        let parity = call - put - (s - k * (-r * t).exp());
        assert!(parity.abs() < 1e-9, "parity residual {parity}");
    }

    #[test]
    fn test_delta_bounds_and_theta_sign() {
        for &(s, k, v, t) in &[
            (100.0, 80.0, 0.2, 0.1),
            (100.0, 100.0, 0.3, 1.0),
            (100.0, 140.0, 0.5, 2.0),
            (50.0, 55.0, 0.15, 0.05),
        ] {
            let call = greeks(s, k, 0.05, v, t, OptionType::Call);
            let put = greeks(s, k, 0.05, v, t, OptionType::Put);
            assert!(
                (0.0..=1.0).contains(&call.delta),
                "call delta {} out of [0,1]",
                call.delta
            );
            assert!(
                (-1.0..=0.0).contains(&put.delta),
                "put delta {} out of [-1,0]",
                put.delta
            );
            assert!(call.theta <= 0.0, "call theta {} should decay", call.theta);
            assert!(call.gamma > 0.0);
            assert!(call.vega > 0.0);
        }
    }

    #[test]
    fn test_deterministic_bit_identical() {
        let c = leap(Some(0.25), Some(11.0), Some(11.6));
        let a = value_contract(&c, 102.0, 0.043, today()).unwrap();
        let b = value_contract(&c, 102.0, 0.043, today()).unwrap();
        assert_eq!(
            a.theoretical_value.to_bits(),
            b.theoretical_value.to_bits(),
            "value must be bit-identical across calls"
        );
        assert_eq!(a.greeks.delta.to_bits(), b.greeks.delta.to_bits());
        assert_eq!(a.edge.to_bits(), b.edge.to_bits());
    }

    #[test]
    fn test_missing_iv_is_invalid_input() {
        let c = leap(None, Some(11.0), Some(11.6));
        let err = value_contract(&c, 102.0, 0.043, today()).unwrap_err();
        assert!(matches!(err, PricingError::InvalidInput(_)));
        assert!(err.to_string().contains("implied volatility"));
    }

    #[test]
    fn test_zero_vol_and_expired_rejected() {
        let c = leap(Some(0.0), Some(11.0), Some(11.6));
        assert!(value_contract(&c, 102.0, 0.043, today()).is_err());

        let mut expired = leap(Some(0.25), Some(11.0), Some(11.6));
        expired.expiry = today();
        assert!(value_contract(&expired, 102.0, 0.043, today()).is_err());
    }

    #[test]
    fn test_unavailable_rate_fails_loudly() {
        let c = leap(Some(0.25), Some(11.0), Some(11.6));
        assert!(value_contract(&c, 102.0, f64::NAN, today()).is_err());
        assert!(value_contract(&c, 102.0, -0.01, today()).is_err());
    }

    #[test]
    fn test_no_market_price_rejected() {
        let c = leap(Some(0.25), None, None);
        let err = value_contract(&c, 102.0, 0.043, today()).unwrap_err();
        assert!(err.to_string().contains("no bid/ask"));
    }

    #[test]
    fn test_edge_sign_convention() {
        // Quote the contract well below model value: positive edge.
        let c = leap(Some(0.25), Some(1.0), Some(1.2));
        let v = value_contract(&c, 102.0, 0.043, today()).unwrap();
        assert!(v.theoretical_value > 1.1);
        assert!(v.edge > 0.0, "cheap contract should carry positive edge");
        assert!((v.edge - (v.theoretical_value - v.market_price)).abs() < 1e-12);
    }
}
