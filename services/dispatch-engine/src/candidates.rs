//! Nearest-candidate search
//!
//! Pure ranking over a slice of driver snapshots: filter to dispatchable
//! drivers inside the radius and outside the exclusion set, sort ascending
//! by great-circle distance, cap the result. No locking: availability is a
//! point-in-time read and staleness is resolved by the accept/decline
//! protocol, not here.
//!
//! At fleet sizes where a linear scan hurts, a spatial index (grid or
//! R-tree) can replace the scan behind the same function contract.

use std::cmp::Ordering;
use std::collections::HashSet;
use types::driver::DriverSnapshot;
use types::geo::Coordinate;
use types::ids::DriverId;

/// Result-size cap for one candidate query.
pub const MAX_CANDIDATES: usize = 20;

/// One ranked candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver: DriverSnapshot,
    /// Snapshot coordinate the distance was computed from
    pub location: Coordinate,
    pub distance_km: f64,
}

/// Rank dispatchable drivers by distance from `origin`.
///
/// Drivers in `exclude` never appear, regardless of distance. Zero
/// candidates is a valid result. Ties in distance keep their input order;
/// the ordering between equidistant drivers is not part of the contract.
pub fn rank_candidates(
    origin: Coordinate,
    radius_km: f64,
    drivers: &[DriverSnapshot],
    exclude: &HashSet<DriverId>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = drivers
        .iter()
        .filter(|d| d.is_dispatchable() && !exclude.contains(&d.driver_id))
        .filter_map(|d| {
            let location = d.location?;
            let distance_km = origin.haversine_km(&location);
            (distance_km <= radius_km).then(|| Candidate {
                driver: d.clone(),
                location,
                distance_km,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(MAX_CANDIDATES);
    candidates
}
