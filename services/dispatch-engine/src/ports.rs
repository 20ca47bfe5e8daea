//! Collaborator ports
//!
//! The engine owns no storage and no transport. It talks to four seams:
//! the persistence collaborator, the real-time fan-out, the routing
//! provider, and the promo lookup. Each is an async trait so callers can
//! plug a real backend, the in-memory store, or a test double.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::attempt::{DeclineReason, DispatchAttempt};
use types::driver::DriverSnapshot;
use types::events::ServerEvent;
use types::geo::Coordinate;
use types::ids::{AttemptId, DriverId, RideId, UserId};
use types::ride::{Ride, RideStatus};

/// Persistence-layer failure modes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// A conditional update found the record in a different state than the
    /// caller expected
    #[error("conflict: {0}")]
    Conflict(String),

    /// The attempt already carries a response; the record is immutable now
    #[error("attempt already responded: {0}")]
    AlreadyResponded(AttemptId),

    /// Backend temporarily unreachable; safe to retry
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One audit record per surge computation, written whether or not the
/// multiplier came out above 1.0x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeSample {
    pub origin: Coordinate,
    pub demand: usize,
    pub supply: usize,
    pub multiplier: Decimal,
    pub sampled_at: i64,
}

/// Persistence collaborator.
///
/// Reads are point-in-time; the three conditional updates (`accept_ride`,
/// `transition_ride`, `mark_attempt_responded`) are the primitives the
/// race guards are built on and must be atomic per record.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_ride(&self, ride: Ride) -> Result<(), StoreError>;
    async fn ride(&self, ride_id: RideId) -> Result<Ride, StoreError>;

    /// Assign a driver and move the ride Pending -> Accepted in one atomic
    /// step. Fails with `Conflict` if the ride has left Pending.
    async fn accept_ride(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
        at: i64,
    ) -> Result<Ride, StoreError>;

    /// Move the ride `expected_from` -> `to`, stamping the timestamp that
    /// belongs to the target state. Fails with `Conflict` when the current
    /// status is not `expected_from`.
    async fn transition_ride(
        &self,
        ride_id: RideId,
        expected_from: RideStatus,
        to: RideStatus,
        reason: Option<String>,
        at: i64,
    ) -> Result<Ride, StoreError>;

    async fn create_attempt(&self, attempt: DispatchAttempt) -> Result<(), StoreError>;
    async fn attempt(&self, attempt_id: AttemptId) -> Result<DispatchAttempt, StoreError>;
    async fn attempts_for_ride(&self, ride_id: RideId) -> Result<Vec<DispatchAttempt>, StoreError>;

    /// Record a response on an outstanding attempt. This is the
    /// conditional-update primitive: it fails with `AlreadyResponded` when
    /// a response exists, and the first writer wins.
    async fn mark_attempt_responded(
        &self,
        attempt_id: AttemptId,
        accepted: bool,
        reason: Option<DeclineReason>,
        at: i64,
    ) -> Result<DispatchAttempt, StoreError>;

    /// The outstanding attempt currently offered to a driver, if any.
    /// Used by the reconnect resync.
    async fn outstanding_attempt_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<DispatchAttempt>, StoreError>;

    async fn upsert_driver(&self, driver: DriverSnapshot) -> Result<(), StoreError>;
    async fn driver(&self, driver_id: DriverId) -> Result<DriverSnapshot, StoreError>;

    /// All drivers that are online, approved, and reporting a coordinate.
    async fn available_drivers(&self) -> Result<Vec<DriverSnapshot>, StoreError>;

    /// Pending rides created at or after `since` whose pickup lies within
    /// `radius_km` of `origin`.
    async fn count_unmatched_rides_within(
        &self,
        origin: Coordinate,
        radius_km: f64,
        since: i64,
    ) -> Result<usize, StoreError>;

    /// Available drivers within `radius_km` of `origin`.
    async fn count_available_drivers_within(
        &self,
        origin: Coordinate,
        radius_km: f64,
    ) -> Result<usize, StoreError>;

    async fn record_surge_sample(&self, sample: SurgeSample) -> Result<(), StoreError>;
}

/// Delivery outcome for a targeted push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// At least one live connection received the event
    Delivered,
    /// The user has no live connection; the caller may log, never fail
    NoConnection,
}

/// Real-time fan-out seam. Implemented by the gateway's connection
/// registry; delivery goes to every live connection of the identity.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user: UserId, event: ServerEvent) -> Delivery;
}

/// Distance/duration estimate from the routing provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_mins: f64,
}

/// External routing/geocoding provider. Failures are expected; the fare
/// quoter falls back to great-circle distance.
#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn estimate(
        &self,
        pickup: Coordinate,
        dropoff: Coordinate,
    ) -> Result<RouteEstimate, StoreError>;
}

/// Promo-code discount lookup. Unknown codes and lookup failures both mean
/// "no discount"; a promo problem never fails a quote.
#[async_trait]
pub trait PromoLookup: Send + Sync {
    async fn discount(&self, code: &str) -> Option<Decimal>;
}
