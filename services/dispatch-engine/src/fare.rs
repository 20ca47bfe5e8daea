//! Fare quoting
//!
//! Pure arithmetic over the configured rates: base + per-km + per-minute,
//! surge applied as a multiplier over the metered portion, promo discount
//! subtracted last, and the total floored at the minimum fare. Distance and
//! duration arrive from the routing provider or the great-circle fallback;
//! everything monetary stays in Decimal.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use types::fare::FareBreakdown;

use crate::config::FareConfig;

/// Quote a fare.
///
/// `surge_multiplier` >= 1.0 scales base + distance + time; the surge field
/// records only the amount added on top. `discount` is clamped so the total
/// never drops below the configured minimum (and never below zero).
pub fn quote_fare(
    config: &FareConfig,
    distance_km: f64,
    duration_mins: f64,
    surge_multiplier: Decimal,
    discount: Decimal,
) -> FareBreakdown {
    let km = Decimal::from_f64(distance_km.max(0.0)).unwrap_or(Decimal::ZERO);
    let mins = Decimal::from_f64(duration_mins.max(0.0)).unwrap_or(Decimal::ZERO);

    let base = config.base;
    let distance = (config.per_km * km).round_dp(2);
    let time = (config.per_minute * mins).round_dp(2);

    let metered = base + distance + time;
    let surge = ((surge_multiplier - Decimal::ONE).max(Decimal::ZERO) * metered).round_dp(2);

    let discount = discount.max(Decimal::ZERO);
    let undiscounted = metered + surge;
    let total = (undiscounted - discount).max(config.minimum_fare);
    // A discount can reach the floor but applied-discount is what actually
    // came off, so the breakdown stays internally consistent.
    let applied_discount = undiscounted - total;

    FareBreakdown {
        base,
        distance,
        time,
        surge,
        discount: applied_discount.max(Decimal::ZERO),
        total,
    }
}

/// Duration fallback when no routing estimate is available: straight-line
/// distance at the configured average speed.
pub fn fallback_duration_mins(config: &FareConfig, distance_km: f64) -> f64 {
    if config.fallback_speed_kmh <= 0.0 {
        return 0.0;
    }
    distance_km / config.fallback_speed_kmh * 60.0
}
