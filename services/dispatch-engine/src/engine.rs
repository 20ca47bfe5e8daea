//! Dispatch engine core
//!
//! Coordinates the candidate finder, the lifecycle machine, the surge
//! estimator, and the collaborator ports into the two entry points that
//! matter: `dispatch` (one retry round) and `respond` (the accept/decline
//! resolver). Every read-check-write sequence for one ride runs under that
//! ride's lock, and the store's conditional updates back the lock up, so
//! at most one acceptance can ever commit per ride.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use types::attempt::{DeclineReason, DispatchAttempt};
use types::driver::DriverSnapshot;
use types::errors::DispatchError;
use types::events::{AssignedEvent, OfferEvent, RidePhase, RideSummary, ServerEvent};
use types::fare::FareBreakdown;
use types::geo::Coordinate;
use types::ids::{AttemptId, DriverId, RideId, RiderId, UserId};
use types::ride::{CancelActor, Ride, RideStatus};

use crate::candidates::rank_candidates;
use crate::config::{DispatchConfig, EngineConfig};
use crate::fare::{fallback_duration_mins, quote_fare};
use crate::lifecycle::validate_transition;
use crate::ports::{
    Delivery, Notifier, PromoLookup, RouteEstimator, Storage, StoreError,
};
use crate::surge::SurgeEstimator;

/// Bounded retries for transient store failures before surfacing them.
const STORE_RETRIES: usize = 3;

/// Retry the wrapped store call on `Unavailable`, up to `STORE_RETRIES`
/// evaluations. Terminal store errors pass straight through.
macro_rules! retry_transient {
    ($call:expr) => {{
        let mut tries = 0;
        loop {
            match $call {
                Err(StoreError::Unavailable(msg)) if tries + 1 < STORE_RETRIES => {
                    tries += 1;
                    debug!(%msg, tries, "transient store error, retrying");
                }
                other => break other,
            }
        }
    }};
}

/// Result of one dispatch round.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// An offer went out to the nearest candidate
    Dispatched {
        attempt: DispatchAttempt,
        radius_km: f64,
    },
    /// No candidate even after the immediate radius bump; the ride stays
    /// Pending for an external re-trigger
    NoCandidate,
    /// The attempt cap was reached; the ride expired
    Exhausted,
}

/// Result of resolving a driver's response.
#[derive(Debug, Clone)]
pub enum RespondOutcome {
    /// The accept won; the ride is assigned to the responder
    Assigned(Ride),
    /// The decline (or timeout) was recorded; `next` is the follow-up
    /// round's outcome, None when the ride had already left Pending
    Declined { next: Option<DispatchOutcome> },
}

/// A new transportation request.
#[derive(Debug, Clone)]
pub struct RideRequest {
    pub rider_id: RiderId,
    pub pickup: Coordinate,
    pub pickup_address: String,
    pub dropoff: Coordinate,
    pub dropoff_address: String,
    pub promo_code: Option<String>,
    /// When set, this driver gets the first offer; open dispatch takes
    /// over if they decline or the bounded wait expires
    pub preferred_driver: Option<DriverId>,
}

/// Compute the search radius for a retry round.
///
/// Radius grows by one step every three exhausted attempts and never
/// exceeds the cap, tying blast-radius growth to sustained failure rather
/// than to every individual decline.
pub fn search_radius(round: usize, config: &DispatchConfig) -> f64 {
    let grown = config.initial_radius_km + (round / 3) as f64 * config.radius_step_km;
    grown.min(config.max_radius_km)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct DispatchEngine {
    store: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    routes: Arc<dyn RouteEstimator>,
    promos: Arc<dyn PromoLookup>,
    surge: SurgeEstimator,
    config: EngineConfig,
    /// Per-ride serialization points for every read-check-write sequence
    ride_locks: DashMap<RideId, Arc<Mutex<()>>>,
    /// Handle to self for the offer-timer tasks
    self_ref: Weak<DispatchEngine>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
        routes: Arc<dyn RouteEstimator>,
        promos: Arc<dyn PromoLookup>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let surge = SurgeEstimator::new(store.clone(), config.surge.clone());
        Arc::new_cyclic(|self_ref| Self {
            store,
            notifier,
            routes,
            promos,
            surge,
            config,
            ride_locks: DashMap::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ride_lock(&self, ride_id: RideId) -> Arc<Mutex<()>> {
        self.ride_locks
            .entry(ride_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn ride_checked(&self, ride_id: RideId) -> Result<Ride, DispatchError> {
        retry_transient!(self.store.ride(ride_id).await).map_err(|err| match err {
            StoreError::NotFound(_) => DispatchError::ride_not_found(ride_id),
            other => DispatchError::Transient(other.to_string()),
        })
    }

    async fn attempt_checked(&self, attempt_id: AttemptId) -> Result<DispatchAttempt, DispatchError> {
        retry_transient!(self.store.attempt(attempt_id).await).map_err(|err| match err {
            StoreError::NotFound(_) => DispatchError::attempt_not_found(attempt_id),
            other => DispatchError::Transient(other.to_string()),
        })
    }

    async fn driver_checked(&self, driver_id: DriverId) -> Result<DriverSnapshot, DispatchError> {
        retry_transient!(self.store.driver(driver_id).await).map_err(|err| match err {
            StoreError::NotFound(_) => DispatchError::driver_not_found(driver_id),
            other => DispatchError::Transient(other.to_string()),
        })
    }

    // ---------------------------------------------------------------------
    // Ride creation and fare quoting
    // ---------------------------------------------------------------------

    /// Quote the fare for a prospective trip without creating anything.
    pub async fn quote(&self, pickup: Coordinate, dropoff: Coordinate) -> FareBreakdown {
        let (distance_km, duration_mins) = self.route_or_fallback(pickup, dropoff).await;
        let multiplier = self.surge.estimate(pickup, now_ms()).await;
        quote_fare(
            &self.config.fare,
            distance_km,
            duration_mins,
            multiplier,
            Decimal::ZERO,
        )
    }

    /// Create a ride and trigger dispatch for it.
    ///
    /// On-demand requests go straight to open dispatch; requests naming a
    /// preferred driver offer that driver first and fall through to open
    /// dispatch via the ordinary exclusion mechanism.
    pub async fn create_ride(
        &self,
        request: RideRequest,
    ) -> Result<(Ride, DispatchOutcome), DispatchError> {
        let now = now_ms();
        let (distance_km, duration_mins) =
            self.route_or_fallback(request.pickup, request.dropoff).await;
        let multiplier = self.surge.estimate(request.pickup, now).await;
        let discount = match &request.promo_code {
            Some(code) => self.promos.discount(code).await.unwrap_or(Decimal::ZERO),
            None => Decimal::ZERO,
        };
        let fare = quote_fare(
            &self.config.fare,
            distance_km,
            duration_mins,
            multiplier,
            discount,
        );

        let ride = Ride::new(
            request.rider_id,
            request.pickup,
            request.pickup_address,
            request.dropoff,
            request.dropoff_address,
            fare,
            now,
        );
        let ride_id = ride.ride_id;
        retry_transient!(self.store.create_ride(ride.clone()).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        info!(%ride_id, rider_id = %ride.rider_id, "ride created");

        let outcome = match request.preferred_driver {
            Some(driver_id) => self.dispatch_preferred(ride_id, driver_id).await?,
            None => self.dispatch(ride_id).await?,
        };
        Ok((ride, outcome))
    }

    async fn route_or_fallback(&self, pickup: Coordinate, dropoff: Coordinate) -> (f64, f64) {
        match self.routes.estimate(pickup, dropoff).await {
            Ok(est) => (est.distance_km, est.duration_mins),
            Err(err) => {
                let distance_km = pickup.haversine_km(&dropoff);
                warn!(%err, distance_km, "route estimate failed, using great-circle fallback");
                (
                    distance_km,
                    fallback_duration_mins(&self.config.fare, distance_km),
                )
            }
        }
    }

    // ---------------------------------------------------------------------
    // Dispatch retry controller
    // ---------------------------------------------------------------------

    /// Run one dispatch round for a pending ride.
    ///
    /// Fire-and-forget per round: the returned outcome says what went out,
    /// not what the driver answered. The next round is triggered by the
    /// response resolver (decline) or the offer timer (silence).
    pub async fn dispatch(&self, ride_id: RideId) -> Result<DispatchOutcome, DispatchError> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;
        self.dispatch_round(ride_id).await
    }

    /// One round, caller already holds the ride lock.
    async fn dispatch_round(
        &self,
        ride_id: RideId,
    ) -> Result<DispatchOutcome, DispatchError> {
        let ride = self.ride_checked(ride_id).await?;
        if ride.status != RideStatus::Pending {
            return Err(DispatchError::UnexpectedStatus {
                expected: RideStatus::Pending,
                actual: ride.status,
            });
        }

        let prior = retry_transient!(self.store.attempts_for_ride(ride_id).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        let exclude: HashSet<DriverId> = prior.iter().map(|a| a.driver_id).collect();
        let round = prior.len();

        if round >= self.config.dispatch.max_attempts {
            return self.expire_ride(&ride).await;
        }

        let radius_km = search_radius(round, &self.config.dispatch);
        let drivers = retry_transient!(self.store.available_drivers().await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;

        let mut ranked = rank_candidates(ride.pickup, radius_km, &drivers, &exclude);
        let mut used_radius = radius_km;
        if ranked.is_empty() {
            // One immediate bump before giving up on this round.
            let wider = (radius_km + self.config.dispatch.radius_step_km)
                .min(self.config.dispatch.max_radius_km);
            if wider > radius_km {
                ranked = rank_candidates(ride.pickup, wider, &drivers, &exclude);
                used_radius = wider;
            }
        }

        let Some(best) = ranked.into_iter().next() else {
            info!(%ride_id, round, radius_km = used_radius, "no candidates in range");
            return Ok(DispatchOutcome::NoCandidate);
        };

        self.send_offer(
            &ride,
            best.driver.driver_id,
            best.location,
            round,
            used_radius,
            self.config.dispatch.offer_timeout_secs,
        )
        .await
    }

    /// Offer the ride to one specific driver and arm the offer timer.
    async fn send_offer(
        &self,
        ride: &Ride,
        driver_id: DriverId,
        driver_location: Coordinate,
        round: usize,
        radius_km: f64,
        timeout_secs: u64,
    ) -> Result<DispatchOutcome, DispatchError> {
        let now = now_ms();
        let distance_m = ride.pickup.haversine_m(&driver_location);
        let attempt = DispatchAttempt::new(ride.ride_id, driver_id, driver_location, distance_m, now);
        retry_transient!(self.store.create_attempt(attempt.clone()).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;

        let offer = ServerEvent::Offer(OfferEvent {
            attempt_id: attempt.attempt_id,
            ride: RideSummary::from(ride),
            distance_to_pickup_m: distance_m,
            expires_in_secs: timeout_secs,
        });
        let delivery = self.notifier.send(UserId::from(driver_id), offer).await;
        if delivery == Delivery::NoConnection {
            // The attempt stays outstanding; the driver's reconnect resync
            // picks it up, favoring at-least-once delivery over a lost offer.
            warn!(
                ride_id = %ride.ride_id,
                %driver_id,
                attempt_id = %attempt.attempt_id,
                "offer target has no live connection"
            );
        }

        info!(
            ride_id = %ride.ride_id,
            %driver_id,
            attempt_id = %attempt.attempt_id,
            round,
            radius_km,
            distance_m,
            "dispatch offer sent"
        );

        self.arm_offer_timer(attempt.attempt_id, timeout_secs);

        Ok(DispatchOutcome::Dispatched { attempt, radius_km })
    }

    /// Offer the ride to the rider's pre-selected driver first.
    async fn dispatch_preferred(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
    ) -> Result<DispatchOutcome, DispatchError> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.ride_checked(ride_id).await?;
        if ride.status != RideStatus::Pending {
            return Err(DispatchError::UnexpectedStatus {
                expected: RideStatus::Pending,
                actual: ride.status,
            });
        }

        let driver = self.driver_checked(driver_id).await?;
        let Some(location) = driver.location.filter(|_| driver.is_dispatchable()) else {
            info!(%ride_id, %driver_id, "preferred driver unavailable, opening dispatch");
            return self.dispatch_round(ride_id).await;
        };

        // The preferred offer waits its own bounded window before open
        // dispatch takes over through the ordinary timeout path.
        self.send_offer(
            &ride,
            driver_id,
            location,
            0,
            self.config.dispatch.initial_radius_km,
            self.config.dispatch.preferred_driver_wait_secs,
        )
        .await
    }

    /// Transition a pending ride to Expired after the attempt cap.
    async fn expire_ride(&self, ride: &Ride) -> Result<DispatchOutcome, DispatchError> {
        validate_transition(ride.status, RideStatus::Expired)?;
        retry_transient!(
            self.store
                .transition_ride(ride.ride_id, RideStatus::Pending, RideStatus::Expired, None, now_ms())
                .await
        )
        .map_err(|err| DispatchError::Transient(err.to_string()))?;

        info!(ride_id = %ride.ride_id, "dispatch attempts exhausted, ride expired");
        self.notifier
            .send(
                UserId::from(ride.rider_id),
                ServerEvent::RideUpdate {
                    ride_id: ride.ride_id,
                    phase: RidePhase::Expired,
                },
            )
            .await;
        Ok(DispatchOutcome::Exhausted)
    }

    fn arm_offer_timer(&self, attempt_id: AttemptId, timeout_secs: u64) {
        if timeout_secs == 0 {
            return;
        }
        let Some(engine) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
            engine.expire_offer(attempt_id).await;
        });
    }

    // ---------------------------------------------------------------------
    // Response resolver
    // ---------------------------------------------------------------------

    /// Resolve a driver's answer to an offer.
    ///
    /// Guards run in order: the attempt must exist, the responder must own
    /// it, and it must not already carry a response. The accept path is a
    /// single unit under the ride lock: a lost race leaves the attempt
    /// unanswered-by-us and yields an explicit conflict, never a silent
    /// no-op.
    pub async fn respond(
        &self,
        attempt_id: AttemptId,
        responder: DriverId,
        accepted: bool,
        reason: Option<DeclineReason>,
    ) -> Result<RespondOutcome, DispatchError> {
        let attempt = self.attempt_checked(attempt_id).await?;
        if attempt.driver_id != responder {
            return Err(DispatchError::Unauthorized(format!(
                "attempt {attempt_id} was not offered to this driver"
            )));
        }

        let lock = self.ride_lock(attempt.ride_id);
        let _guard = lock.lock().await;

        // Freshness check under the lock; the store's conditional update
        // would also catch this, but the early guard gives the caller the
        // precise rejection.
        let attempt = self.attempt_checked(attempt_id).await?;
        if !attempt.is_outstanding() {
            return Err(DispatchError::AlreadyResponded { attempt_id });
        }

        if accepted {
            self.accept_locked(&attempt, responder).await
        } else {
            let reason = reason.unwrap_or(DeclineReason::Other);
            self.decline_locked(&attempt, reason, true).await
        }
    }

    /// Timer path: treat silence as a decline with reason Timeout.
    ///
    /// Quiet no-op when the attempt was answered first (or no longer
    /// exists); the race is expected, not an error.
    pub async fn expire_offer(&self, attempt_id: AttemptId) {
        let attempt = match self.attempt_checked(attempt_id).await {
            Ok(attempt) => attempt,
            Err(err) => {
                debug!(%attempt_id, %err, "offer expiry skipped");
                return;
            }
        };

        let lock = self.ride_lock(attempt.ride_id);
        let _guard = lock.lock().await;

        let attempt = match self.attempt_checked(attempt_id).await {
            Ok(attempt) if attempt.is_outstanding() => attempt,
            _ => return,
        };

        info!(
            %attempt_id,
            ride_id = %attempt.ride_id,
            driver_id = %attempt.driver_id,
            "offer timed out, treating as decline"
        );
        if let Err(err) = self
            .decline_locked(&attempt, DeclineReason::Timeout, false)
            .await
        {
            warn!(%attempt_id, %err, "offer expiry failed");
        }
    }

    /// Accept path, ride lock held.
    async fn accept_locked(
        &self,
        attempt: &DispatchAttempt,
        responder: DriverId,
    ) -> Result<RespondOutcome, DispatchError> {
        let ride = self.ride_checked(attempt.ride_id).await?;
        if validate_transition(ride.status, RideStatus::Accepted).is_err() {
            // Another path moved the ride out of Pending; the conflict is
            // explicit and the attempt stays as it was.
            return Err(DispatchError::UnexpectedStatus {
                expected: RideStatus::Pending,
                actual: ride.status,
            });
        }

        let driver = self.driver_checked(responder).await?;
        let now = now_ms();

        retry_transient!(
            self.store
                .mark_attempt_responded(attempt.attempt_id, true, None, now)
                .await
        )
        .map_err(|err| match err {
            StoreError::AlreadyResponded(attempt_id) => {
                DispatchError::AlreadyResponded { attempt_id }
            }
            other => DispatchError::Transient(other.to_string()),
        })?;

        let ride = retry_transient!(self.store.accept_ride(attempt.ride_id, responder, now).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;

        info!(
            ride_id = %ride.ride_id,
            driver_id = %responder,
            attempt_id = %attempt.attempt_id,
            "ride accepted"
        );

        self.notifier
            .send(
                UserId::from(ride.rider_id),
                ServerEvent::Assigned(AssignedEvent {
                    ride: ride.clone(),
                    driver_name: driver.name.clone(),
                    vehicle: driver.vehicle.clone(),
                }),
            )
            .await;
        self.notifier
            .send(
                UserId::from(responder),
                ServerEvent::AcceptConfirmed { ride: ride.clone() },
            )
            .await;

        Ok(RespondOutcome::Assigned(ride))
    }

    /// Decline path, ride lock held. `explicit` distinguishes a driver's
    /// decline from the timer's.
    async fn decline_locked(
        &self,
        attempt: &DispatchAttempt,
        reason: DeclineReason,
        explicit: bool,
    ) -> Result<RespondOutcome, DispatchError> {
        let now = now_ms();
        retry_transient!(
            self.store
                .mark_attempt_responded(attempt.attempt_id, false, Some(reason), now)
                .await
        )
        .map_err(|err| match err {
            StoreError::AlreadyResponded(attempt_id) => {
                DispatchError::AlreadyResponded { attempt_id }
            }
            other => DispatchError::Transient(other.to_string()),
        })?;

        let driver_user = UserId::from(attempt.driver_id);
        let confirmation = if explicit {
            ServerEvent::DeclinedConfirmed {
                attempt_id: attempt.attempt_id,
            }
        } else {
            ServerEvent::OfferExpired {
                attempt_id: attempt.attempt_id,
            }
        };
        self.notifier.send(driver_user, confirmation).await;

        info!(
            ride_id = %attempt.ride_id,
            driver_id = %attempt.driver_id,
            attempt_id = %attempt.attempt_id,
            ?reason,
            "offer declined, starting next round"
        );

        // Next round on the same ride. A ride that already left Pending
        // (rider cancelled mid-offer) just ends the cascade.
        let next = match self.dispatch_round(attempt.ride_id).await {
            Ok(outcome) => Some(outcome),
            Err(DispatchError::UnexpectedStatus { .. }) => None,
            Err(err) => return Err(err),
        };

        if let Some(outcome) = &next {
            let ride = self.ride_checked(attempt.ride_id).await?;
            let phase = match outcome {
                DispatchOutcome::Dispatched { .. } => Some(RidePhase::Searching),
                DispatchOutcome::NoCandidate => Some(RidePhase::NoDrivers),
                // expire_ride already told the rider
                DispatchOutcome::Exhausted => None,
            };
            if let Some(phase) = phase {
                self.notifier
                    .send(
                        UserId::from(ride.rider_id),
                        ServerEvent::RideUpdate {
                            ride_id: ride.ride_id,
                            phase,
                        },
                    )
                    .await;
            }
        }

        Ok(RespondOutcome::Declined { next })
    }

    // ---------------------------------------------------------------------
    // Ride lifecycle operations
    // ---------------------------------------------------------------------

    /// Driver reports arrival at the pickup point.
    pub async fn mark_arrived(&self, ride_id: RideId, driver: DriverId) -> Result<Ride, DispatchError> {
        self.driver_transition(ride_id, driver, RideStatus::DriverArrived, RidePhase::DriverArrived)
            .await
    }

    /// Driver starts the trip.
    pub async fn start_ride(&self, ride_id: RideId, driver: DriverId) -> Result<Ride, DispatchError> {
        self.driver_transition(ride_id, driver, RideStatus::Started, RidePhase::Started)
            .await
    }

    /// Driver completes the trip.
    pub async fn complete_ride(&self, ride_id: RideId, driver: DriverId) -> Result<Ride, DispatchError> {
        self.driver_transition(ride_id, driver, RideStatus::Completed, RidePhase::Completed)
            .await
    }

    async fn driver_transition(
        &self,
        ride_id: RideId,
        driver: DriverId,
        to: RideStatus,
        phase: RidePhase,
    ) -> Result<Ride, DispatchError> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.ride_checked(ride_id).await?;
        if ride.driver_id != Some(driver) {
            return Err(DispatchError::Unauthorized(format!(
                "ride {ride_id} is not assigned to this driver"
            )));
        }
        validate_transition(ride.status, to)?;

        let updated = retry_transient!(
            self.store
                .transition_ride(ride_id, ride.status, to, None, now_ms())
                .await
        )
        .map_err(|err| DispatchError::Transient(err.to_string()))?;

        info!(%ride_id, %driver, status = %to, "ride transitioned");
        self.notifier
            .send(
                UserId::from(updated.rider_id),
                ServerEvent::RideUpdate { ride_id, phase },
            )
            .await;
        Ok(updated)
    }

    /// Cancel a ride on behalf of the rider, the assigned driver, or the
    /// system. The actor picks the terminal state; any outstanding offer is
    /// closed and its driver told the offer is gone.
    pub async fn cancel_ride(
        &self,
        ride_id: RideId,
        actor: CancelActor,
        requester: Option<UserId>,
        reason: Option<String>,
    ) -> Result<Ride, DispatchError> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.ride_checked(ride_id).await?;
        match actor {
            CancelActor::Rider => {
                if requester != Some(UserId::from(ride.rider_id)) {
                    return Err(DispatchError::Unauthorized(
                        "only the requester may cancel as rider".to_string(),
                    ));
                }
            }
            CancelActor::Driver => {
                let assigned = ride.driver_id.map(UserId::from);
                if requester.is_none() || requester != assigned {
                    return Err(DispatchError::Unauthorized(
                        "only the assigned driver may cancel as driver".to_string(),
                    ));
                }
            }
            CancelActor::System => {}
        }

        let target = actor.terminal_status();
        validate_transition(ride.status, target)?;

        let updated = retry_transient!(
            self.store
                .transition_ride(ride_id, ride.status, target, reason.clone(), now_ms())
                .await
        )
        .map_err(|err| DispatchError::Transient(err.to_string()))?;

        // Close any outstanding offer so its driver is not left answering
        // a dead attempt.
        let close_reason = match actor {
            CancelActor::Rider => DeclineReason::Rider,
            CancelActor::Driver | CancelActor::System => DeclineReason::Other,
        };
        if let Ok(attempts) = self.store.attempts_for_ride(ride_id).await {
            if let Some(open) = attempts.into_iter().find(|a| a.is_outstanding()) {
                let _ = self
                    .store
                    .mark_attempt_responded(open.attempt_id, false, Some(close_reason), now_ms())
                    .await;
                self.notifier
                    .send(
                        UserId::from(open.driver_id),
                        ServerEvent::OfferExpired {
                            attempt_id: open.attempt_id,
                        },
                    )
                    .await;
            }
        }

        info!(%ride_id, ?actor, status = %target, "ride cancelled");

        // Tell the counterpart.
        self.notifier
            .send(
                UserId::from(updated.rider_id),
                ServerEvent::RideUpdate {
                    ride_id,
                    phase: RidePhase::Cancelled,
                },
            )
            .await;
        if let Some(driver_id) = updated.driver_id {
            self.notifier
                .send(
                    UserId::from(driver_id),
                    ServerEvent::RideUpdate {
                        ride_id,
                        phase: RidePhase::Cancelled,
                    },
                )
                .await;
        }

        Ok(updated)
    }

    // ---------------------------------------------------------------------
    // Queries and presence
    // ---------------------------------------------------------------------

    pub async fn ride(&self, ride_id: RideId) -> Result<Ride, DispatchError> {
        self.ride_checked(ride_id).await
    }

    /// The offer a reconnecting driver should be re-shown, if any.
    pub async fn outstanding_offer_for(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<OfferEvent>, DispatchError> {
        let attempt = retry_transient!(self.store.outstanding_attempt_for_driver(driver_id).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        let Some(attempt) = attempt else {
            return Ok(None);
        };
        let ride = self.ride_checked(attempt.ride_id).await?;

        let elapsed_secs = ((now_ms() - attempt.sent_at).max(0) / 1000) as u64;
        let expires_in_secs = self
            .config
            .dispatch
            .offer_timeout_secs
            .saturating_sub(elapsed_secs);

        Ok(Some(OfferEvent {
            attempt_id: attempt.attempt_id,
            ride: RideSummary::from(&ride),
            distance_to_pickup_m: attempt.distance_to_pickup_m,
            expires_in_secs,
        }))
    }

    /// Register or replace a driver record.
    pub async fn register_driver(&self, driver: DriverSnapshot) -> Result<(), DispatchError> {
        retry_transient!(self.store.upsert_driver(driver.clone()).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        info!(driver_id = %driver.driver_id, online = driver.online, "driver registered");
        Ok(())
    }

    /// Update a driver's online flag and coordinate.
    pub async fn update_presence(
        &self,
        driver_id: DriverId,
        online: bool,
        location: Option<Coordinate>,
    ) -> Result<DriverSnapshot, DispatchError> {
        let mut driver = self.driver_checked(driver_id).await?;
        driver.online = online;
        driver.location = location;
        retry_transient!(self.store.upsert_driver(driver.clone()).await)
            .map_err(|err| DispatchError::Transient(err.to_string()))?;
        debug!(%driver_id, online, "driver presence updated");
        Ok(driver)
    }

    /// Current surge multiplier at a coordinate.
    pub async fn surge_multiplier(&self, origin: Coordinate) -> Decimal {
        self.surge.estimate(origin, now_ms()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> DispatchConfig {
        DispatchConfig {
            initial_radius_km: 5.0,
            radius_step_km: 2.0,
            max_radius_km: 15.0,
            max_attempts: 10,
            offer_timeout_secs: 30,
            preferred_driver_wait_secs: 30,
        }
    }

    #[test]
    fn test_radius_holds_for_first_three_rounds() {
        let cfg = config();
        assert_eq!(search_radius(0, &cfg), 5.0);
        assert_eq!(search_radius(1, &cfg), 5.0);
        assert_eq!(search_radius(2, &cfg), 5.0);
        assert_eq!(search_radius(3, &cfg), 7.0);
        assert_eq!(search_radius(6, &cfg), 9.0);
    }

    #[test]
    fn test_radius_caps_at_max() {
        let cfg = config();
        assert_eq!(search_radius(100, &cfg), 15.0);
    }

    proptest! {
        #[test]
        fn prop_radius_monotonic_and_bounded(rounds in 1usize..50) {
            let cfg = config();
            let mut last = 0.0f64;
            for round in 0..rounds {
                let r = search_radius(round, &cfg);
                prop_assert!(r >= last, "radius shrank at round {round}");
                prop_assert!(r <= cfg.max_radius_km);
                last = r;
            }
        }
    }
}
