//! Surge estimator
//!
//! Samples local demand (unmatched requests in a trailing window) against
//! local supply (available drivers) around a coordinate and maps the ratio
//! to a stepped multiplier. Every computation writes an audit sample (the
//! write is the point, not a cache), and any failure to obtain the counts
//! fails soft to 1.0x so pricing never aborts on an observability problem.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;
use types::geo::Coordinate;

use crate::config::SurgeConfig;
use crate::ports::{Storage, SurgeSample};

/// Map a demand/supply ratio to a multiplier step.
///
/// Division-by-zero is guarded by flooring supply at 1. Pure; the clamp to
/// the configured maximum happens here too.
pub fn multiplier_for(demand: usize, supply: usize, max: Decimal) -> Decimal {
    let ratio = demand as f64 / supply.max(1) as f64;
    let stepped = if ratio >= 3.0 {
        Decimal::new(20, 1) // 2.0x
    } else if ratio >= 2.0 {
        Decimal::new(15, 1) // 1.5x
    } else if ratio >= 1.0 {
        Decimal::new(125, 2) // 1.25x
    } else {
        Decimal::ONE
    };
    stepped.min(max)
}

/// Demand/supply sampler bound to a store.
pub struct SurgeEstimator {
    store: Arc<dyn Storage>,
    config: SurgeConfig,
}

impl SurgeEstimator {
    pub fn new(store: Arc<dyn Storage>, config: SurgeConfig) -> Self {
        Self { store, config }
    }

    /// Estimate the multiplier at `origin`, recording an audit sample.
    ///
    /// Never fails: count or audit-write errors degrade to 1.0x with a
    /// warning on the log, not an error to the caller.
    pub async fn estimate(&self, origin: Coordinate, now: i64) -> Decimal {
        let since = now - self.config.demand_window_mins * 60 * 1000;

        let demand = self
            .store
            .count_unmatched_rides_within(origin, self.config.demand_radius_km, since)
            .await;
        let supply = self
            .store
            .count_available_drivers_within(origin, self.config.supply_radius_km)
            .await;

        let (demand, supply) = match (demand, supply) {
            (Ok(d), Ok(s)) => (d, s),
            (d, s) => {
                warn!(
                    lat = origin.lat,
                    lon = origin.lon,
                    demand_err = d.is_err(),
                    supply_err = s.is_err(),
                    "surge counts unavailable, defaulting to 1.0x"
                );
                return Decimal::ONE;
            }
        };

        let multiplier = multiplier_for(demand, supply, self.config.max_multiplier);

        let sample = SurgeSample {
            origin,
            demand,
            supply,
            multiplier,
            sampled_at: now,
        };
        if let Err(err) = self.store.record_surge_sample(sample).await {
            warn!(%err, "surge audit sample write failed");
        }

        multiplier
    }
}
