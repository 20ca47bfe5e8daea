//! Driver availability types
//!
//! The engine reads driver availability as a point-in-time snapshot from the
//! store and never locks drivers; staleness between the read and the offer
//! is tolerated by design of the accept/decline protocol.

use crate::geo::Coordinate;
use crate::ids::DriverId;
use serde::{Deserialize, Serialize};

/// Vehicle details shown to the rider when a driver is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub make: String,
    pub model: String,
    pub plate: String,
}

/// Point-in-time driver availability snapshot.
///
/// A driver is dispatchable when online, approved, and reporting a
/// coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub driver_id: DriverId,
    pub name: String,
    pub online: bool,
    pub approved: bool,
    pub location: Option<Coordinate>,
    pub vehicle: VehicleInfo,
}

impl DriverSnapshot {
    /// Whether this driver can currently receive offers.
    pub fn is_dispatchable(&self) -> bool {
        self.online && self.approved && self.location.is_some()
    }
}
