//! In-memory storage backend
//!
//! Single-process implementation of the `Storage` port on concurrent maps.
//! Each conditional update holds the per-key entry guard for the whole
//! read-check-write, so "first writer wins" holds without any external
//! locking. Rides and attempts in terminal states are retained for audit.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use types::attempt::{DeclineReason, DispatchAttempt};
use types::driver::DriverSnapshot;
use types::geo::Coordinate;
use types::ids::{AttemptId, DriverId, RideId};
use types::ride::{Ride, RideStatus};

use crate::ports::{Storage, StoreError, SurgeSample};

/// Concurrent in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    rides: DashMap<RideId, Ride>,
    attempts: DashMap<AttemptId, DispatchAttempt>,
    drivers: DashMap<DriverId, DriverSnapshot>,
    surge_samples: Mutex<Vec<SurgeSample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded surge audit samples, oldest first. Test and analytics hook.
    pub fn surge_samples(&self) -> Vec<SurgeSample> {
        self.surge_samples
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Stamp the lifecycle timestamp that belongs to the target status.
fn stamp(ride: &mut Ride, to: RideStatus, at: i64) {
    match to {
        RideStatus::Accepted => ride.accepted_at = Some(at),
        RideStatus::DriverArrived => ride.arrived_at = Some(at),
        RideStatus::Started => ride.started_at = Some(at),
        RideStatus::Completed => ride.completed_at = Some(at),
        RideStatus::CancelledByRider
        | RideStatus::CancelledByDriver
        | RideStatus::CancelledBySystem
        | RideStatus::Expired => ride.cancelled_at = Some(at),
        RideStatus::Pending => {}
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_ride(&self, ride: Ride) -> Result<(), StoreError> {
        self.rides.insert(ride.ride_id, ride);
        Ok(())
    }

    async fn ride(&self, ride_id: RideId) -> Result<Ride, StoreError> {
        self.rides
            .get(&ride_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound(format!("ride {ride_id}")))
    }

    async fn accept_ride(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
        at: i64,
    ) -> Result<Ride, StoreError> {
        let mut entry = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| StoreError::NotFound(format!("ride {ride_id}")))?;
        if entry.status != RideStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "ride {ride_id} is {}, expected PENDING",
                entry.status
            )));
        }
        entry.status = RideStatus::Accepted;
        entry.driver_id = Some(driver_id);
        entry.accepted_at = Some(at);
        Ok(entry.clone())
    }

    async fn transition_ride(
        &self,
        ride_id: RideId,
        expected_from: RideStatus,
        to: RideStatus,
        reason: Option<String>,
        at: i64,
    ) -> Result<Ride, StoreError> {
        let mut entry = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| StoreError::NotFound(format!("ride {ride_id}")))?;
        if entry.status != expected_from {
            return Err(StoreError::Conflict(format!(
                "ride {ride_id} is {}, expected {expected_from}",
                entry.status
            )));
        }
        entry.status = to;
        if reason.is_some() {
            entry.cancel_reason = reason;
        }
        stamp(&mut entry, to, at);
        Ok(entry.clone())
    }

    async fn create_attempt(&self, attempt: DispatchAttempt) -> Result<(), StoreError> {
        self.attempts.insert(attempt.attempt_id, attempt);
        Ok(())
    }

    async fn attempt(&self, attempt_id: AttemptId) -> Result<DispatchAttempt, StoreError> {
        self.attempts
            .get(&attempt_id)
            .map(|a| a.clone())
            .ok_or_else(|| StoreError::NotFound(format!("attempt {attempt_id}")))
    }

    async fn attempts_for_ride(&self, ride_id: RideId) -> Result<Vec<DispatchAttempt>, StoreError> {
        let mut attempts: Vec<DispatchAttempt> = self
            .attempts
            .iter()
            .filter(|a| a.ride_id == ride_id)
            .map(|a| a.clone())
            .collect();
        // Attempt ids are UUID v7, so this is creation order even when two
        // attempts share a millisecond.
        attempts.sort_by_key(|a| (a.sent_at, a.attempt_id));
        Ok(attempts)
    }

    async fn mark_attempt_responded(
        &self,
        attempt_id: AttemptId,
        accepted: bool,
        reason: Option<DeclineReason>,
        at: i64,
    ) -> Result<DispatchAttempt, StoreError> {
        let mut entry = self
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| StoreError::NotFound(format!("attempt {attempt_id}")))?;
        if entry.responded_at.is_some() {
            return Err(StoreError::AlreadyResponded(attempt_id));
        }
        entry.responded_at = Some(at);
        entry.accepted = Some(accepted);
        entry.decline_reason = if accepted { None } else { reason };
        Ok(entry.clone())
    }

    async fn outstanding_attempt_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<DispatchAttempt>, StoreError> {
        Ok(self
            .attempts
            .iter()
            .find(|a| a.driver_id == driver_id && a.is_outstanding())
            .map(|a| a.clone()))
    }

    async fn upsert_driver(&self, driver: DriverSnapshot) -> Result<(), StoreError> {
        self.drivers.insert(driver.driver_id, driver);
        Ok(())
    }

    async fn driver(&self, driver_id: DriverId) -> Result<DriverSnapshot, StoreError> {
        self.drivers
            .get(&driver_id)
            .map(|d| d.clone())
            .ok_or_else(|| StoreError::NotFound(format!("driver {driver_id}")))
    }

    async fn available_drivers(&self) -> Result<Vec<DriverSnapshot>, StoreError> {
        Ok(self
            .drivers
            .iter()
            .filter(|d| d.is_dispatchable())
            .map(|d| d.clone())
            .collect())
    }

    async fn count_unmatched_rides_within(
        &self,
        origin: Coordinate,
        radius_km: f64,
        since: i64,
    ) -> Result<usize, StoreError> {
        Ok(self
            .rides
            .iter()
            .filter(|r| {
                r.status == RideStatus::Pending
                    && r.created_at >= since
                    && origin.haversine_km(&r.pickup) <= radius_km
            })
            .count())
    }

    async fn count_available_drivers_within(
        &self,
        origin: Coordinate,
        radius_km: f64,
    ) -> Result<usize, StoreError> {
        Ok(self
            .drivers
            .iter()
            .filter(|d| {
                d.is_dispatchable()
                    && d.location
                        .map(|loc| origin.haversine_km(&loc) <= radius_km)
                        .unwrap_or(false)
            })
            .count())
    }

    async fn record_surge_sample(&self, sample: SurgeSample) -> Result<(), StoreError> {
        self.surge_samples
            .lock()
            .map_err(|_| StoreError::Unavailable("surge sample log poisoned".to_string()))?
            .push(sample);
        Ok(())
    }
}
