//! Historical FX rates: provider client and cache-backed resolver.

pub mod error;
pub mod provider;
pub mod resolver;
mod types;

pub use error::FxError;
pub use provider::{HttpRateProvider, RateProvider};
pub use resolver::{FxRateResolver, ResolvedRate, WarmReport};
