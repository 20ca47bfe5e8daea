//! Fare breakdown for a ride
//!
//! All monetary values are `rust_decimal::Decimal` for deterministic
//! arithmetic. The total is floored at a configured minimum and is never
//! negative, no matter how large the promo discount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Itemized fare for one ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    /// Flag-down amount charged on every ride
    pub base: Decimal,
    /// Distance component (per-km rate x estimated km)
    pub distance: Decimal,
    /// Time component (per-minute rate x estimated minutes)
    pub time: Decimal,
    /// Additional amount from the surge multiplier (0 when surge is 1.0x)
    pub surge: Decimal,
    /// Promo discount applied, as a non-negative amount subtracted from the total
    pub discount: Decimal,
    /// Final charged amount: base + distance + time + surge - discount,
    /// floored at the configured minimum fare
    pub total: Decimal,
}

impl FareBreakdown {
    /// A zero fare, used as the placeholder before quoting completes.
    pub fn zero() -> Self {
        Self {
            base: Decimal::ZERO,
            distance: Decimal::ZERO,
            time: Decimal::ZERO,
            surge: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}
