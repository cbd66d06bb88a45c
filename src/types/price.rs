use serde::{Deserialize, Serialize};
use std::fmt;
use crate::BPS_DENOMINATOR;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u128);  // Fixed-point with 18 decimal places

impl Price {
    pub const DECIMALS: u32 = 18;
    const MULTIPLIER: u128 = 10u128.pow(Self::DECIMALS);

    pub const fn from_raw(value: u128) -> Self {
        Price(value)
    }

    pub const fn raw_value(&self) -> u128 {
        self.0
    }

    /// Whole units, e.g. `Price::from_units(100)` is 100.0.
    pub const fn from_units(units: u64) -> Self {
        Price(units as u128 * Self::MULTIPLIER)
    }

    /// For configuration and display only; aggregation never goes through f64.
    pub fn from_f64(value: f64) -> Self {
        if value <= 0.0 || !value.is_finite() {
            return Price(0);
        }
        Price((value * Self::MULTIPLIER as f64).round() as u128)
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Self::MULTIPLIER as f64
    }

    pub const fn zero() -> Self {
        Price(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn abs_diff(&self, other: Price) -> u128 {
        self.0.abs_diff(other.0)
    }

    /// Distance from `reference` in basis points, rounded down and saturating
    /// at `u128::MAX`. `None` when the reference is zero.
    pub fn deviation_bps(&self, reference: Price) -> Option<u128> {
        if reference.is_zero() {
            return None;
        }
        let diff = self.abs_diff(reference);
        let whole = (diff / reference.0).saturating_mul(BPS_DENOMINATOR as u128);
        let fraction = mul_div_below(diff % reference.0, BPS_DENOMINATOR, reference.0);
        Some(whole.saturating_add(fraction))
    }
}

/// `floor(a * b / d)` for `a < d` without a wider intermediate.
fn mul_div_below(a: u128, b: u32, d: u128) -> u128 {
    let mut quotient: u128 = 0;
    let mut remainder: u128 = 0;
    for bit in (0..u32::BITS).rev() {
        // remainder stays below d, so doubling it carries at most one into the quotient
        quotient <<= 1;
        if remainder >= d - remainder {
            remainder -= d - remainder;
            quotient += 1;
        } else {
            remainder += remainder;
        }
        if (b >> bit) & 1 == 1 {
            if remainder >= d - a {
                remainder -= d - a;
                quotient += 1;
            } else {
                remainder += a;
            }
        }
    }
    quotient
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::MULTIPLIER;
        let frac = self.0 % Self::MULTIPLIER;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:0width$}", frac, width = Self::DECIMALS as usize);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}
