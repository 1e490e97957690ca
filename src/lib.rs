//! LEAP option screening over real market data.
//!
//! The pipeline acquires option chains from a prioritized set of
//! providers (with caching, single-flight deduplication, and fallback),
//! values every contract with Black-Scholes using provider-reported
//! implied volatility, scores liquidity, filters against configurable
//! threshold bands, and ranks survivors by a composite of edge,
//! liquidity, and risk-adjusted exposure.
//!
//! Two rules hold everywhere: a missing input is represented as
//! missing, never zero-filled; and a symbol with no trustworthy data
//! produces an error, never an empty or defaulted result.

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod errors;
pub mod export;
pub mod liquidity;
pub mod pipeline;
pub mod pricing;
pub mod providers;
pub mod rank;
pub mod screen;
pub mod types;

pub use acquisition::AcquisitionManager;
pub use config::ScreenerConfig;
pub use errors::{AcquisitionError, ConfigError, PricingError, ProviderFailure};
pub use export::{export_rows, ExportRow};
pub use pipeline::{ScreenReport, Screener};
pub use rank::RankedContract;
pub use types::{ChainSnapshot, Greeks, OptionContract, PricedContract, ProviderKind, Quote};
