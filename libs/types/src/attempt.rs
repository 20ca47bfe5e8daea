//! Dispatch attempt types
//!
//! One DispatchAttempt is one offer of one ride to one driver. For a given
//! ride at most one attempt is ever outstanding (no response recorded), and
//! a driver appears at most once across all of a ride's attempts. Once a
//! response is recorded the attempt is immutable.

use crate::geo::Coordinate;
use crate::ids::{AttemptId, DriverId, RideId};
use serde::{Deserialize, Serialize};

/// Why a driver declined (or was treated as declining) an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclineReason {
    /// Driver explicitly declined: currently occupied
    Busy,
    /// Driver explicitly declined: pickup too far
    TooFar,
    /// Driver explicitly declined: rider-related reason
    Rider,
    /// The offer expired without a response; the timer path declines with this
    Timeout,
    /// Any other explicit decline
    Other,
}

/// One offer of a ride to one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub attempt_id: AttemptId,
    pub ride_id: RideId,
    pub driver_id: DriverId,
    /// Driver coordinate snapshot at send time
    pub driver_location: Coordinate,
    /// Distance from the driver snapshot to the pickup, in meters
    pub distance_to_pickup_m: u32,
    pub sent_at: i64,
    /// Unix millis of the response; None while the attempt is outstanding
    pub responded_at: Option<i64>,
    /// None until answered, then the driver's decision
    pub accepted: Option<bool>,
    /// Set only when declined
    pub decline_reason: Option<DeclineReason>,
}

impl DispatchAttempt {
    /// Create a new outstanding attempt.
    pub fn new(
        ride_id: RideId,
        driver_id: DriverId,
        driver_location: Coordinate,
        distance_to_pickup_m: u32,
        sent_at: i64,
    ) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            ride_id,
            driver_id,
            driver_location,
            distance_to_pickup_m,
            sent_at,
            responded_at: None,
            accepted: None,
            decline_reason: None,
        }
    }

    /// An attempt is outstanding while no response has been recorded.
    pub fn is_outstanding(&self) -> bool {
        self.responded_at.is_none()
    }
}
