//! Engine configuration
//!
//! Plain structs with defaults matching production tuning. Radii are
//! kilometers, money is Decimal, durations are seconds.

use rust_decimal::Decimal;

/// Dispatch retry controller tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Search radius for the first rounds, km
    pub initial_radius_km: f64,
    /// Radius growth applied every third exhausted round, km
    pub radius_step_km: f64,
    /// Hard cap on the search radius, km
    pub max_radius_km: f64,
    /// Attempt cap; reaching it expires the ride
    pub max_attempts: usize,
    /// Seconds an offer stays open before the timer declines it.
    /// Zero disables the timer entirely.
    pub offer_timeout_secs: u64,
    /// Bounded wait for a pre-selected driver before falling back to
    /// open dispatch, seconds
    pub preferred_driver_wait_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: 5.0,
            radius_step_km: 2.0,
            max_radius_km: 15.0,
            max_attempts: 10,
            offer_timeout_secs: 30,
            preferred_driver_wait_secs: 30,
        }
    }
}

/// Surge estimator tuning.
#[derive(Debug, Clone)]
pub struct SurgeConfig {
    /// Trailing window for counting unmatched demand, minutes
    pub demand_window_mins: i64,
    /// Radius for counting unmatched requests, km
    pub demand_radius_km: f64,
    /// Radius for counting available drivers, km
    pub supply_radius_km: f64,
    /// Global cap on the multiplier
    pub max_multiplier: Decimal,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            demand_window_mins: 15,
            demand_radius_km: 3.0,
            supply_radius_km: 5.0,
            max_multiplier: Decimal::new(20, 1), // 2.0x
        }
    }
}

/// Fare quoting rates.
#[derive(Debug, Clone)]
pub struct FareConfig {
    /// Flag-down amount
    pub base: Decimal,
    /// Per-kilometer rate
    pub per_km: Decimal,
    /// Per-minute rate
    pub per_minute: Decimal,
    /// Floor applied to the final total
    pub minimum_fare: Decimal,
    /// Assumed average speed for the duration fallback when the routing
    /// provider is unavailable, km/h
    pub fallback_speed_kmh: f64,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            base: Decimal::new(4500, 2),       // 45.00
            per_km: Decimal::new(1500, 2),     // 15.00
            per_minute: Decimal::new(200, 2),  // 2.00
            minimum_fare: Decimal::new(6000, 2), // 60.00
            fallback_speed_kmh: 25.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    pub surge: SurgeConfig,
    pub fare: FareConfig,
}
