//! Ride lifecycle types
//!
//! A ride is one transportation request. Its status only ever moves through
//! the transitions the lifecycle machine in the dispatch engine permits, and
//! terminal rides are retained for audit, never deleted.

use crate::fare::FareBreakdown;
use crate::geo::Coordinate;
use crate::ids::{DriverId, RideId, RiderId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ride status.
///
/// Forward path: Pending -> Accepted -> DriverArrived -> Started -> Completed.
/// The three cancellation states are distinct so downstream analytics can
/// attribute the cause without parsing a free-text reason. Expired means the
/// dispatch attempt cap was reached without an acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    Accepted,
    DriverArrived,
    Started,
    Completed,
    CancelledByRider,
    CancelledByDriver,
    CancelledBySystem,
    Expired,
}

impl RideStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed
                | RideStatus::CancelledByRider
                | RideStatus::CancelledByDriver
                | RideStatus::CancelledBySystem
                | RideStatus::Expired
        )
    }

    /// Check if status counts as cancelled, regardless of who initiated it
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RideStatus::CancelledByRider
                | RideStatus::CancelledByDriver
                | RideStatus::CancelledBySystem
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RideStatus::Pending => "PENDING",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::DriverArrived => "DRIVER_ARRIVED",
            RideStatus::Started => "STARTED",
            RideStatus::Completed => "COMPLETED",
            RideStatus::CancelledByRider => "CANCELLED_BY_RIDER",
            RideStatus::CancelledByDriver => "CANCELLED_BY_DRIVER",
            RideStatus::CancelledBySystem => "CANCELLED_BY_SYSTEM",
            RideStatus::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// Who initiated a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelActor {
    Rider,
    Driver,
    System,
}

impl CancelActor {
    /// The terminal status this actor's cancellation lands the ride in.
    pub fn terminal_status(&self) -> RideStatus {
        match self {
            CancelActor::Rider => RideStatus::CancelledByRider,
            CancelActor::Driver => RideStatus::CancelledByDriver,
            CancelActor::System => RideStatus::CancelledBySystem,
        }
    }
}

/// Complete ride record.
///
/// `driver_id` is set if and only if the ride reached Accepted; lifecycle
/// timestamps are unix milliseconds and stamped by the operation that
/// performs the matching transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub ride_id: RideId,
    pub rider_id: RiderId,
    pub status: RideStatus,
    pub driver_id: Option<DriverId>,
    pub pickup: Coordinate,
    pub pickup_address: String,
    pub dropoff: Coordinate,
    pub dropoff_address: String,
    pub fare: FareBreakdown,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
    pub arrived_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub cancel_reason: Option<String>,
}

impl Ride {
    /// Create a new pending ride.
    pub fn new(
        rider_id: RiderId,
        pickup: Coordinate,
        pickup_address: String,
        dropoff: Coordinate,
        dropoff_address: String,
        fare: FareBreakdown,
        created_at: i64,
    ) -> Self {
        Self {
            ride_id: RideId::new(),
            rider_id,
            status: RideStatus::Pending,
            driver_id: None,
            pickup,
            pickup_address,
            dropoff,
            dropoff_address,
            fare,
            created_at,
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }
}
