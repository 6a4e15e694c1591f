//! Fixed-precision rounding for converted spend amounts.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Tie-breaking rule applied when a converted amount lands exactly halfway
/// between two representable values at the configured scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Banker's rounding: 0.125 → 0.12, 0.135 → 0.14.
    HalfEven,
    /// Commercial rounding: 0.125 → 0.13, -0.125 → -0.13.
    HalfAwayFromZero,
}

impl RoundingRule {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HalfEven => "half_even",
            Self::HalfAwayFromZero => "half_away_from_zero",
        }
    }

    fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
            Self::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

impl FromStr for RoundingRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_even" | "bankers" => Ok(Self::HalfEven),
            "half_away_from_zero" | "half_up" => Ok(Self::HalfAwayFromZero),
            other => Err(format!(
                "unknown rounding rule '{other}' (expected half_even or half_away_from_zero)"
            )),
        }
    }
}

/// Rounding configuration: number of decimal places plus tie-breaking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountRounding {
    pub scale: u32,
    pub rule: RoundingRule,
}

impl Default for AmountRounding {
    fn default() -> Self {
        Self {
            scale: 2,
            rule: RoundingRule::HalfEven,
        }
    }
}

impl AmountRounding {
    /// Rounds `value` and pads it to exactly `scale` decimal places, so
    /// `108` and `108.0` both become `108.00` and serialize identically.
    #[must_use]
    pub fn apply(&self, value: Decimal) -> Decimal {
        let mut rounded = value.round_dp_with_strategy(self.scale, self.rule.strategy());
        rounded.rescale(self.scale);
        rounded
    }

    /// Converts `amount` with `rate` and rounds the product once.
    ///
    /// The multiplication is carried out at full precision; rounding is only
    /// applied to the final result. Returns `None` if the product does not
    /// fit in a [`Decimal`].
    #[must_use]
    pub fn convert(&self, amount: Decimal, rate: Decimal) -> Option<Decimal> {
        amount.checked_mul(rate).map(|product| self.apply(product))
    }
}
