//! Real-time event protocol
//!
//! The server->client and client->server payloads are closed, tagged enums
//! so the fan-out layer and every client-side event switch stay exhaustive.
//! Event names are the wire contract; payload shapes carry everything the
//! receiving party needs to act without a follow-up fetch.

use crate::attempt::DeclineReason;
use crate::driver::VehicleInfo;
use crate::fare::FareBreakdown;
use crate::geo::Coordinate;
use crate::ids::{AttemptId, RideId};
use crate::ride::Ride;
use serde::{Deserialize, Serialize};

/// The slice of a ride a driver needs to decide on an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSummary {
    pub ride_id: RideId,
    pub pickup: Coordinate,
    pub pickup_address: String,
    pub dropoff: Coordinate,
    pub dropoff_address: String,
    pub fare: FareBreakdown,
}

impl From<&Ride> for RideSummary {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.ride_id,
            pickup: ride.pickup,
            pickup_address: ride.pickup_address.clone(),
            dropoff: ride.dropoff,
            dropoff_address: ride.dropoff_address.clone(),
            fare: ride.fare.clone(),
        }
    }
}

/// A new offer pushed to a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferEvent {
    pub attempt_id: AttemptId,
    pub ride: RideSummary,
    pub distance_to_pickup_m: u32,
    /// Seconds the driver has before the offer is treated as declined
    pub expires_in_secs: u64,
}

/// Driver + vehicle details pushed to the requester on assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedEvent {
    pub ride: Ride,
    pub driver_name: String,
    pub vehicle: VehicleInfo,
}

/// Dispatch and lifecycle progress, pushed to the affected parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RidePhase {
    /// A dispatch round is underway or will be retried
    Searching,
    /// No candidates were found; the ride stays open
    NoDrivers,
    /// The attempt cap was reached; the ride expired
    Expired,
    /// The ride was cancelled
    Cancelled,
    /// The driver reported arrival at the pickup point
    DriverArrived,
    /// The trip started
    Started,
    /// The trip completed
    Completed,
}

/// Server -> client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// New offer for a driver
    Offer(OfferEvent),
    /// Driver assigned, sent to the requester
    Assigned(AssignedEvent),
    /// Acceptance confirmed, sent to the accepting driver
    AcceptConfirmed { ride: Ride },
    /// Decline recorded, sent to the declining driver
    DeclinedConfirmed { attempt_id: AttemptId },
    /// The offer timed out before a response, sent to the offered driver
    OfferExpired { attempt_id: AttemptId },
    /// Dispatch / lifecycle progress, sent to the requester
    RideUpdate { ride_id: RideId, phase: RidePhase },
    /// Authorization or validation failure on an inbound message
    Error { message: String },
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// A driver's answer to an offer
    Respond {
        attempt_id: AttemptId,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DeclineReason>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_names() {
        let ev = ServerEvent::DeclinedConfirmed {
            attempt_id: AttemptId::new(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event\":\"declined-confirmed\""), "{json}");
    }

    #[test]
    fn test_respond_message_roundtrip() {
        let json = format!(
            r#"{{"action":"respond","attempt_id":"{}","accepted":false,"reason":"BUSY"}}"#,
            AttemptId::new()
        );
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::Respond {
                accepted, reason, ..
            } => {
                assert!(!accepted);
                assert_eq!(reason, Some(DeclineReason::Busy));
            }
        }
    }

    #[test]
    fn test_respond_reason_is_optional() {
        let json = format!(
            r#"{{"action":"respond","attempt_id":"{}","accepted":true}}"#,
            AttemptId::new()
        );
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::Respond { reason, .. } => assert_eq!(reason, None),
        }
    }

    #[test]
    fn test_ride_phase_wire_names() {
        let json = serde_json::to_string(&RidePhase::NoDrivers).unwrap();
        assert_eq!(json, "\"no-drivers\"");
    }
}
