//! End-to-end dispatch flow tests
//!
//! Exercises the engine against the in-memory store with a recording
//! notifier: first-try assignment, decline cascades, exhaustion, the
//! accept race, offer timeouts, and the ride lifecycle operations.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use dispatch_engine::config::{DispatchConfig, EngineConfig};
use dispatch_engine::engine::{DispatchEngine, DispatchOutcome, RespondOutcome, RideRequest};
use dispatch_engine::memory::MemoryStore;
use dispatch_engine::ports::{
    Delivery, Notifier, PromoLookup, RouteEstimate, RouteEstimator, Storage, StoreError,
};

use types::attempt::DeclineReason;
use types::driver::{DriverSnapshot, VehicleInfo};
use types::errors::DispatchError;
use types::events::{RidePhase, ServerEvent};
use types::geo::Coordinate;
use types::ids::{DriverId, RiderId, UserId};
use types::ride::{CancelActor, RideStatus};

/// Notifier double that records every delivery and can simulate a user
/// with no live connection.
#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<(UserId, ServerEvent)>>,
    offline: AtomicBool,
}

impl RecordingNotifier {
    fn events_for(&self, user: UserId) -> Vec<ServerEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, e)| e.clone())
            .collect()
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user: UserId, event: ServerEvent) -> Delivery {
        if self.offline.load(Ordering::SeqCst) {
            return Delivery::NoConnection;
        }
        self.events.lock().unwrap().push((user, event));
        Delivery::Delivered
    }
}

/// Routing provider double that always fails, forcing the great-circle
/// fallback the quoter must handle.
struct DownRoutes;

#[async_trait]
impl RouteEstimator for DownRoutes {
    async fn estimate(
        &self,
        _pickup: Coordinate,
        _dropoff: Coordinate,
    ) -> Result<RouteEstimate, StoreError> {
        Err(StoreError::Unavailable("routing service down".to_string()))
    }
}

/// Promo double with one known code.
struct OnePromo;

#[async_trait]
impl PromoLookup for OnePromo {
    async fn discount(&self, code: &str) -> Option<Decimal> {
        (code == "SAVE50").then(|| Decimal::new(5000, 2))
    }
}

const PICKUP: Coordinate = Coordinate { lat: 14.50, lon: 121.00 };
const DROPOFF: Coordinate = Coordinate { lat: 14.55, lon: 121.05 };

fn harness_with(
    dispatch: DispatchConfig,
) -> (Arc<DispatchEngine>, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = EngineConfig {
        dispatch,
        ..EngineConfig::default()
    };
    let engine = DispatchEngine::new(
        store.clone(),
        notifier.clone(),
        Arc::new(DownRoutes),
        Arc::new(OnePromo),
        config,
    );
    (engine, store, notifier)
}

/// Timers disabled: tests drive expiry explicitly where they need it.
fn harness() -> (Arc<DispatchEngine>, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    harness_with(DispatchConfig {
        offer_timeout_secs: 0,
        preferred_driver_wait_secs: 0,
        ..DispatchConfig::default()
    })
}

async fn add_driver(store: &MemoryStore, lat: f64, lon: f64) -> DriverId {
    let driver = DriverSnapshot {
        driver_id: DriverId::new(),
        name: "Test Driver".to_string(),
        online: true,
        approved: true,
        location: Some(Coordinate::new(lat, lon)),
        vehicle: VehicleInfo {
            make: "Toyota".to_string(),
            model: "Vios".to_string(),
            plate: "AAA 111".to_string(),
        },
    };
    let id = driver.driver_id;
    store.upsert_driver(driver).await.unwrap();
    id
}

fn request(rider: RiderId) -> RideRequest {
    RideRequest {
        rider_id: rider,
        pickup: PICKUP,
        pickup_address: "Pickup St".to_string(),
        dropoff: DROPOFF,
        dropoff_address: "Dropoff Ave".to_string(),
        promo_code: None,
        preferred_driver: None,
    }
}

#[tokio::test]
async fn first_try_dispatch_and_accept() {
    let (engine, store, notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;
    let rider = RiderId::new();

    let (ride, outcome) = engine.create_ride(request(rider)).await.unwrap();
    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, radius_km } => {
            assert_eq!(radius_km, 5.0);
            assert_eq!(attempt.driver_id, driver);
            assert!(attempt.distance_to_pickup_m < 1000);
            attempt
        }
        other => panic!("expected Dispatched, got {other:?}"),
    };

    // The driver got the offer.
    let driver_events = notifier.events_for(UserId::from(driver));
    assert!(matches!(driver_events[0], ServerEvent::Offer(_)));

    // Accept wins the ride.
    let outcome = engine
        .respond(attempt.attempt_id, driver, true, None)
        .await
        .unwrap();
    let assigned = match outcome {
        RespondOutcome::Assigned(ride) => ride,
        other => panic!("expected Assigned, got {other:?}"),
    };
    assert_eq!(assigned.status, RideStatus::Accepted);
    assert_eq!(assigned.driver_id, Some(driver));
    assert!(assigned.accepted_at.is_some());

    // Both parties heard about it.
    let rider_events = notifier.events_for(UserId::from(rider));
    assert!(rider_events
        .iter()
        .any(|e| matches!(e, ServerEvent::Assigned(_))));
    let driver_events = notifier.events_for(UserId::from(driver));
    assert!(driver_events
        .iter()
        .any(|e| matches!(e, ServerEvent::AcceptConfirmed { .. })));

    let stored = store.ride(ride.ride_id).await.unwrap();
    assert_eq!(stored.status, RideStatus::Accepted);
}

#[tokio::test]
async fn decline_cascades_to_second_driver_at_same_radius() {
    let (engine, store, _notifier) = harness();
    let near = add_driver(&store, 14.505, 121.005).await;
    let far = add_driver(&store, 14.52, 121.02).await;

    let (ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let first = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    assert_eq!(first.driver_id, near, "nearest driver offered first");

    let outcome = engine
        .respond(first.attempt_id, near, false, Some(DeclineReason::Busy))
        .await
        .unwrap();
    let next = match outcome {
        RespondOutcome::Declined { next: Some(next) } => next,
        other => panic!("expected Declined with next round, got {other:?}"),
    };
    match next {
        DispatchOutcome::Dispatched { attempt, radius_km } => {
            assert_eq!(attempt.driver_id, far, "second driver offered next");
            // Round 1 < 3: no radius expansion yet.
            assert_eq!(radius_km, 5.0);
        }
        other => panic!("expected Dispatched, got {other:?}"),
    }

    let attempts = store.attempts_for_ride(ride.ride_id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    let declined = attempts.iter().find(|a| a.driver_id == near).unwrap();
    assert_eq!(declined.decline_reason, Some(DeclineReason::Busy));
}

#[tokio::test]
async fn no_drivers_returns_no_candidate_without_side_effects() {
    let (engine, store, _notifier) = harness();

    let (ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::NoCandidate));

    let attempts = store.attempts_for_ride(ride.ride_id).await.unwrap();
    assert!(attempts.is_empty(), "no attempt may be created");
    let stored = store.ride(ride.ride_id).await.unwrap();
    assert_eq!(stored.status, RideStatus::Pending, "ride stays open");
}

#[tokio::test]
async fn exclusion_set_grows_by_one_per_round() {
    let (engine, store, _notifier) = harness();
    let mut drivers = Vec::new();
    for i in 0..5 {
        drivers.push(add_driver(&store, 14.501 + i as f64 * 0.001, 121.001).await);
    }

    let (ride, mut outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let mut offered = Vec::new();
    for _ in 0..5 {
        let attempt = match outcome {
            DispatchOutcome::Dispatched { attempt, .. } => attempt,
            other => panic!("expected Dispatched, got {other:?}"),
        };
        assert!(
            !offered.contains(&attempt.driver_id),
            "driver offered twice"
        );
        offered.push(attempt.driver_id);

        match engine
            .respond(attempt.attempt_id, attempt.driver_id, false, None)
            .await
            .unwrap()
        {
            RespondOutcome::Declined { next: Some(next) } => outcome = next,
            other => panic!("expected Declined with next, got {other:?}"),
        }
    }

    // All five drivers exhausted; the sixth round has nobody left.
    assert!(matches!(outcome, DispatchOutcome::NoCandidate));
    let attempts = store.attempts_for_ride(ride.ride_id).await.unwrap();
    assert_eq!(attempts.len(), 5);
    let unique: std::collections::HashSet<_> = attempts.iter().map(|a| a.driver_id).collect();
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn attempt_cap_expires_the_ride() {
    let (engine, store, notifier) = harness_with(DispatchConfig {
        max_attempts: 3,
        offer_timeout_secs: 0,
        preferred_driver_wait_secs: 0,
        ..DispatchConfig::default()
    });
    for i in 0..4 {
        add_driver(&store, 14.501 + i as f64 * 0.001, 121.001).await;
    }
    let rider = RiderId::new();

    let (ride, mut outcome) = engine.create_ride(request(rider)).await.unwrap();
    for _ in 0..3 {
        let attempt = match outcome {
            DispatchOutcome::Dispatched { attempt, .. } => attempt,
            other => panic!("expected Dispatched, got {other:?}"),
        };
        match engine
            .respond(attempt.attempt_id, attempt.driver_id, false, None)
            .await
            .unwrap()
        {
            RespondOutcome::Declined { next: Some(next) } => outcome = next,
            other => panic!("expected Declined with next, got {other:?}"),
        }
    }

    // The third decline hits the cap: round count == max_attempts.
    assert!(matches!(outcome, DispatchOutcome::Exhausted));
    let stored = store.ride(ride.ride_id).await.unwrap();
    assert_eq!(stored.status, RideStatus::Expired);
    assert_eq!(
        store.attempts_for_ride(ride.ride_id).await.unwrap().len(),
        3,
        "no further attempt after the cap"
    );
    let rider_events = notifier.events_for(UserId::from(rider));
    assert!(rider_events.iter().any(|e| matches!(
        e,
        ServerEvent::RideUpdate {
            phase: RidePhase::Expired,
            ..
        }
    )));
}

#[tokio::test]
async fn at_most_one_acceptance_per_ride() {
    let (engine, store, _notifier) = harness();
    let first = add_driver(&store, 14.505, 121.005).await;
    let second = add_driver(&store, 14.51, 121.01).await;

    let (_ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let attempt1 = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };

    // First driver declines; the ride moves on to the second.
    let attempt2 = match engine
        .respond(attempt1.attempt_id, first, false, Some(DeclineReason::TooFar))
        .await
        .unwrap()
    {
        RespondOutcome::Declined {
            next: Some(DispatchOutcome::Dispatched { attempt, .. }),
        } => attempt,
        other => panic!("expected next round, got {other:?}"),
    };
    assert_eq!(attempt2.driver_id, second);

    // Both respond concurrently: the late accept on the declined attempt
    // must lose, the live one must win, exactly once.
    let (late, live) = tokio::join!(
        engine.respond(attempt1.attempt_id, first, true, None),
        engine.respond(attempt2.attempt_id, second, true, None),
    );

    assert!(matches!(
        late.unwrap_err(),
        DispatchError::AlreadyResponded { .. }
    ));
    match live.unwrap() {
        RespondOutcome::Assigned(ride) => {
            assert_eq!(ride.driver_id, Some(second));
            assert_eq!(ride.status, RideStatus::Accepted);
        }
        other => panic!("expected Assigned, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_accept_is_idempotent_rejection() {
    let (engine, store, _notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;

    let (_ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };

    engine
        .respond(attempt.attempt_id, driver, true, None)
        .await
        .unwrap();

    // A retried client call must not double-apply.
    let err = engine
        .respond(attempt.attempt_id, driver, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyResponded { .. }));
}

#[tokio::test]
async fn respond_guards_run_in_order() {
    let (engine, store, _notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;
    let stranger = add_driver(&store, 14.52, 121.02).await;

    let (_ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    // Unknown attempt -> not found.
    let err = engine
        .respond(types::ids::AttemptId::new(), driver, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { .. }));

    // Someone else's attempt -> not authorized.
    let err = engine
        .respond(attempt.attempt_id, stranger, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized(_)));
}

#[tokio::test(start_paused = true)]
async fn offer_timeout_cascades_like_a_decline() {
    let (engine, store, notifier) = harness_with(DispatchConfig {
        offer_timeout_secs: 30,
        preferred_driver_wait_secs: 30,
        ..DispatchConfig::default()
    });
    let silent = add_driver(&store, 14.505, 121.005).await;
    let next = add_driver(&store, 14.51, 121.01).await;

    let (ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let attempt1 = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    assert_eq!(attempt1.driver_id, silent);

    // Nobody answers; paused time runs the 30s timer out.
    tokio::time::sleep(std::time::Duration::from_secs(31)).await;

    let attempts = store.attempts_for_ride(ride.ride_id).await.unwrap();
    assert_eq!(attempts.len(), 2, "timeout opened the next round");
    let timed_out = attempts.iter().find(|a| a.driver_id == silent).unwrap();
    assert_eq!(timed_out.decline_reason, Some(DeclineReason::Timeout));
    assert!(attempts.iter().any(|a| a.driver_id == next && a.is_outstanding()));

    // The silent driver was told the offer is gone.
    let events = notifier.events_for(UserId::from(silent));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::OfferExpired { .. })));

    // A late answer hits the already-responded guard.
    let err = engine
        .respond(attempt1.attempt_id, silent, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyResponded { .. }));
}

#[tokio::test]
async fn offer_survives_missing_connection_for_resync() {
    let (engine, store, notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;
    notifier.set_offline(true);

    let (_ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));

    // The attempt is still outstanding and recoverable on reconnect.
    let offer = engine.outstanding_offer_for(driver).await.unwrap();
    let offer = offer.expect("outstanding offer must be recoverable");
    assert!(offer.distance_to_pickup_m > 600 && offer.distance_to_pickup_m < 900);
}

#[tokio::test]
async fn preferred_driver_gets_first_offer_then_open_dispatch() {
    let (engine, store, _notifier) = harness();
    let nearest = add_driver(&store, 14.501, 121.001).await;
    let preferred = add_driver(&store, 14.53, 121.03).await;

    let mut req = request(RiderId::new());
    req.preferred_driver = Some(preferred);
    let (_ride, outcome) = engine.create_ride(req).await.unwrap();

    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    assert_eq!(
        attempt.driver_id, preferred,
        "preferred driver offered even though another is nearer"
    );

    // Decline falls through to open dispatch, excluding the preferred.
    match engine
        .respond(attempt.attempt_id, preferred, false, None)
        .await
        .unwrap()
    {
        RespondOutcome::Declined {
            next: Some(DispatchOutcome::Dispatched { attempt, .. }),
        } => assert_eq!(attempt.driver_id, nearest),
        other => panic!("expected fall-through round, got {other:?}"),
    }
}

#[tokio::test]
async fn rider_cancel_closes_outstanding_offer() {
    let (engine, store, notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;
    let rider = RiderId::new();

    let (ride, outcome) = engine.create_ride(request(rider)).await.unwrap();
    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };

    let cancelled = engine
        .cancel_ride(
            ride.ride_id,
            CancelActor::Rider,
            Some(UserId::from(rider)),
            Some("changed plans".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::CancelledByRider);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("changed plans"));

    // The offered driver's attempt is closed and they were told.
    let stored = store.attempt(attempt.attempt_id).await.unwrap();
    assert!(!stored.is_outstanding());
    let events = notifier.events_for(UserId::from(driver));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::OfferExpired { .. })));

    // A late accept gets the explicit rejection, not a silent no-op.
    let err = engine
        .respond(attempt.attempt_id, driver, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyResponded { .. }));
}

#[tokio::test]
async fn lifecycle_operations_stamp_timestamps_in_order() {
    let (engine, store, _notifier) = harness();
    let driver = add_driver(&store, 14.505, 121.005).await;

    let (ride, outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    let attempt = match outcome {
        DispatchOutcome::Dispatched { attempt, .. } => attempt,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    engine
        .respond(attempt.attempt_id, driver, true, None)
        .await
        .unwrap();

    // Wrong driver cannot progress the ride.
    let stranger = DriverId::new();
    let err = engine.mark_arrived(ride.ride_id, stranger).await.unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized(_)));

    // Skipping a phase is an illegal transition.
    let err = engine.start_ride(ride.ride_id, driver).await.unwrap_err();
    assert!(matches!(err, DispatchError::IllegalTransition { .. }));

    let arrived = engine.mark_arrived(ride.ride_id, driver).await.unwrap();
    assert_eq!(arrived.status, RideStatus::DriverArrived);
    let started = engine.start_ride(ride.ride_id, driver).await.unwrap();
    assert_eq!(started.status, RideStatus::Started);
    let completed = engine.complete_ride(ride.ride_id, driver).await.unwrap();
    assert_eq!(completed.status, RideStatus::Completed);

    assert!(completed.accepted_at <= completed.arrived_at);
    assert!(completed.arrived_at <= completed.started_at);
    assert!(completed.started_at <= completed.completed_at);
}

#[tokio::test]
async fn surge_raises_fare_and_writes_audit_samples() {
    let (engine, store, _notifier) = harness();
    // Demand swamps supply: several unmatched rides, one driver.
    for _ in 0..5 {
        engine.create_ride(request(RiderId::new())).await.unwrap();
    }
    add_driver(&store, 14.505, 121.005).await;

    let (ride, _outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    assert!(
        ride.fare.surge > Decimal::ZERO,
        "demand/supply imbalance must surge the fare"
    );

    let samples = store.surge_samples();
    assert_eq!(samples.len(), 6, "every computation writes an audit sample");
    assert!(samples.iter().all(|s| s.multiplier >= Decimal::ONE));
}

#[tokio::test]
async fn promo_discount_applies_and_fare_floors() {
    let (engine, store, _notifier) = harness();
    add_driver(&store, 14.505, 121.005).await;

    let mut req = request(RiderId::new());
    req.promo_code = Some("SAVE50".to_string());
    let (ride, _outcome) = engine.create_ride(req).await.unwrap();
    assert!(ride.fare.discount > Decimal::ZERO);
    assert!(ride.fare.total >= engine.config().fare.minimum_fare);

    // Unknown codes quote cleanly with no discount.
    let mut req = request(RiderId::new());
    req.promo_code = Some("BOGUS".to_string());
    let (ride, _outcome) = engine.create_ride(req).await.unwrap();
    assert_eq!(ride.fare.discount, Decimal::ZERO);
}

#[tokio::test]
async fn transient_store_failures_retry_then_surface() {
    // A store that fails twice then works exercises the bounded retry.
    struct Flaky {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl Storage for Flaky {
        async fn create_ride(&self, ride: types::ride::Ride) -> Result<(), StoreError> {
            self.inner.create_ride(ride).await
        }
        async fn ride(&self, ride_id: types::ids::RideId) -> Result<types::ride::Ride, StoreError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                return Err(StoreError::Unavailable("blip".to_string()));
            }
            self.inner.ride(ride_id).await
        }
        async fn accept_ride(
            &self,
            ride_id: types::ids::RideId,
            driver_id: DriverId,
            at: i64,
        ) -> Result<types::ride::Ride, StoreError> {
            self.inner.accept_ride(ride_id, driver_id, at).await
        }
        async fn transition_ride(
            &self,
            ride_id: types::ids::RideId,
            expected_from: RideStatus,
            to: RideStatus,
            reason: Option<String>,
            at: i64,
        ) -> Result<types::ride::Ride, StoreError> {
            self.inner
                .transition_ride(ride_id, expected_from, to, reason, at)
                .await
        }
        async fn create_attempt(
            &self,
            attempt: types::attempt::DispatchAttempt,
        ) -> Result<(), StoreError> {
            self.inner.create_attempt(attempt).await
        }
        async fn attempt(
            &self,
            attempt_id: types::ids::AttemptId,
        ) -> Result<types::attempt::DispatchAttempt, StoreError> {
            self.inner.attempt(attempt_id).await
        }
        async fn attempts_for_ride(
            &self,
            ride_id: types::ids::RideId,
        ) -> Result<Vec<types::attempt::DispatchAttempt>, StoreError> {
            self.inner.attempts_for_ride(ride_id).await
        }
        async fn mark_attempt_responded(
            &self,
            attempt_id: types::ids::AttemptId,
            accepted: bool,
            reason: Option<DeclineReason>,
            at: i64,
        ) -> Result<types::attempt::DispatchAttempt, StoreError> {
            self.inner
                .mark_attempt_responded(attempt_id, accepted, reason, at)
                .await
        }
        async fn outstanding_attempt_for_driver(
            &self,
            driver_id: DriverId,
        ) -> Result<Option<types::attempt::DispatchAttempt>, StoreError> {
            self.inner.outstanding_attempt_for_driver(driver_id).await
        }
        async fn upsert_driver(&self, driver: DriverSnapshot) -> Result<(), StoreError> {
            self.inner.upsert_driver(driver).await
        }
        async fn driver(&self, driver_id: DriverId) -> Result<DriverSnapshot, StoreError> {
            self.inner.driver(driver_id).await
        }
        async fn available_drivers(&self) -> Result<Vec<DriverSnapshot>, StoreError> {
            self.inner.available_drivers().await
        }
        async fn count_unmatched_rides_within(
            &self,
            origin: Coordinate,
            radius_km: f64,
            since: i64,
        ) -> Result<usize, StoreError> {
            self.inner
                .count_unmatched_rides_within(origin, radius_km, since)
                .await
        }
        async fn count_available_drivers_within(
            &self,
            origin: Coordinate,
            radius_km: f64,
        ) -> Result<usize, StoreError> {
            self.inner
                .count_available_drivers_within(origin, radius_km)
                .await
        }
        async fn record_surge_sample(
            &self,
            sample: dispatch_engine::ports::SurgeSample,
        ) -> Result<(), StoreError> {
            self.inner.record_surge_sample(sample).await
        }
    }

    let flaky = Arc::new(Flaky {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(2),
    });
    let engine = DispatchEngine::new(
        flaky.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(DownRoutes),
        Arc::new(OnePromo),
        EngineConfig {
            dispatch: DispatchConfig {
                offer_timeout_secs: 0,
                preferred_driver_wait_secs: 0,
                ..DispatchConfig::default()
            },
            ..EngineConfig::default()
        },
    );

    let (ride, _outcome) = engine.create_ride(request(RiderId::new())).await.unwrap();
    // Two blips are absorbed by the bounded retry.
    let fetched = engine.ride(ride.ride_id).await.unwrap();
    assert_eq!(fetched.ride_id, ride.ride_id);

    // More consecutive failures than the retry bound surface as transient.
    flaky.failures.store(10, Ordering::SeqCst);
    let err = engine.ride(ride.ride_id).await.unwrap_err();
    assert!(matches!(err, DispatchError::Transient(_)));
}
