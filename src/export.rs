//! Flat export rows for ranked results.
//!
//! One row per ranked contract carrying every input a reviewer needs to
//! audit the decision: observed quote fields, model outputs, edge, and
//! provenance. Serializes to JSON as-is; field order matches the
//! declaration for CSV-style writers.

use crate::rank::RankedContract;
use crate::types::{Greeks, Valuation};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub symbol: String,
    pub option_type: &'static str,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    pub implied_vol: Option<f64>,
    pub underlying_price: f64,
    pub moneyness: f64,
    pub theoretical_value: f64,
    pub market_price: f64,
    pub edge: f64,
    pub edge_pct: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub liquidity_score: f64,
    pub composite_score: f64,
    pub source: &'static str,
}

impl From<&RankedContract> for ExportRow {
    fn from(ranked: &RankedContract) -> Self {
        let priced = &ranked.contract;
        let contract = &priced.contract;
        let Valuation {
            theoretical_value,
            greeks: Greeks { delta, gamma, theta, vega },
            market_price,
            edge,
            edge_pct,
            intrinsic_value,
            time_value,
            moneyness,
            days_to_expiry,
            ..
        } = priced.valuation;

        Self {
            symbol: contract.underlying.clone(),
            option_type: contract.option_type.as_str(),
            strike: contract.strike,
            expiry: contract.expiry,
            days_to_expiry,
            bid: contract.bid,
            ask: contract.ask,
            last: contract.last,
            volume: contract.volume,
            open_interest: contract.open_interest,
            implied_vol: contract.implied_vol,
            underlying_price: priced.underlying_price,
            moneyness,
            theoretical_value,
            market_price,
            edge,
            edge_pct,
            delta,
            gamma,
            theta,
            vega,
            intrinsic_value,
            time_value,
            liquidity_score: priced.liquidity_score,
            composite_score: ranked.composite_score,
            source: contract.source.as_str(),
        }
    }
}

/// Rows in rank order.
pub fn export_rows(ranked: &[RankedContract]) -> Vec<ExportRow> {
    ranked.iter().map(ExportRow::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionContract, OptionType, PricedContract, ProviderKind};

    fn ranked() -> RankedContract {
        let contract = OptionContract {
            underlying: "AMD".into(),
            strike: 150.0,
            expiry: NaiveDate::from_ymd_opt(2027, 6, 18).unwrap(),
            option_type: OptionType::Call,
            bid: Some(31.0),
            ask: Some(31.8),
            last: Some(31.3),
            implied_vol: Some(0.42),
            open_interest: Some(640),
            volume: Some(22),
            source: ProviderKind::Institutional,
        };
        let valuation = Valuation {
            theoretical_value: 33.1,
            greeks: Greeks {
                delta: 0.61,
                gamma: 0.008,
                theta: -0.021,
                vega: 0.72,
            },
            market_price: 31.4,
            edge: 1.7,
            edge_pct: 5.41,
            intrinsic_value: 8.0,
            time_value: 23.4,
            moneyness: 1.053,
            days_to_expiry: 662,
            time_years: 1.81,
        };
        RankedContract {
            contract: PricedContract::new(contract, 158.0, valuation, 0.55),
            composite_score: 0.31,
        }
    }

    #[test]
    fn test_row_carries_provenance_and_model_fields() {
        let rows = export_rows(&[ranked()]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.symbol, "AMD");
        assert_eq!(row.source, "institutional");
        assert_eq!(row.option_type, "call");
        assert_eq!(row.edge, 1.7);
        assert_eq!(row.composite_score, 0.31);
        assert_eq!(row.bid, Some(31.0));
    }

    #[test]
    fn test_row_serializes_with_missing_fields_null() {
        let mut r = ranked();
        r.contract.contract.last = None;
        let json = serde_json::to_value(ExportRow::from(&r)).unwrap();
        assert!(json["last"].is_null(), "missing last must export as null, not zero");
        assert_eq!(json["strike"], 150.0);
        assert_eq!(json["source"], "institutional");
    }
}
