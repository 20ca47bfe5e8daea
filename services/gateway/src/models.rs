use dispatch_engine::DispatchOutcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::attempt::DeclineReason;
use types::driver::VehicleInfo;
use types::events::RidePhase;
use types::geo::Coordinate;
use types::ids::{AttemptId, DriverId};
use types::ride::Ride;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRideRequest {
    pub pickup: Coordinate,
    pub pickup_address: String,
    pub dropoff: Coordinate,
    pub dropoff_address: String,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Pre-selected driver who gets the first offer, if any
    #[serde(default)]
    pub preferred_driver: Option<DriverId>,
}

/// What the dispatch trigger did, in requester-facing terms.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DispatchSummary {
    /// An offer is out; the search continues until someone accepts
    Searching { attempt_id: AttemptId },
    /// Nobody in range right now; the request stays open
    NoDrivers,
    /// The attempt cap was reached
    Expired,
}

impl From<&DispatchOutcome> for DispatchSummary {
    fn from(outcome: &DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Dispatched { attempt, .. } => DispatchSummary::Searching {
                attempt_id: attempt.attempt_id,
            },
            DispatchOutcome::NoCandidate => DispatchSummary::NoDrivers,
            DispatchOutcome::Exhausted => DispatchSummary::Expired,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RideResponse {
    pub ride: Ride,
    pub dispatch: DispatchSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRideRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<DeclineReason>,
}

/// HTTP mirror of the WebSocket respond outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RespondResponse {
    Assigned { ride: Ride },
    Declined { next: Option<RidePhase> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub vehicle: VehicleInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceRequest {
    pub online: bool,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurgeQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurgeResponse {
    pub multiplier: Decimal,
}
