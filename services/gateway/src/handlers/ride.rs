use crate::auth::{AuthenticatedUser, Role};
use crate::error::AppError;
use crate::models::{CancelRideRequest, CreateRideRequest, DispatchSummary, RideResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use dispatch_engine::RideRequest;
use types::ids::{RideId, UserId};
use types::ride::CancelActor;

pub async fn create_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<RideResponse>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:ride_create", user.user_id), 5, 0.2)?;

    let rider_id = user.rider_id()?;
    let (ride, outcome) = state
        .engine
        .create_ride(RideRequest {
            rider_id,
            pickup: payload.pickup,
            pickup_address: payload.pickup_address,
            dropoff: payload.dropoff,
            dropoff_address: payload.dropoff_address,
            promo_code: payload.promo_code,
            preferred_driver: payload.preferred_driver,
        })
        .await?;

    let dispatch = DispatchSummary::from(&outcome);
    Ok(Json(RideResponse { ride, dispatch }))
}

/// Re-trigger dispatch for a ride left Pending by an earlier round that
/// found no candidates.
pub async fn redispatch(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<DispatchSummary>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:ride_dispatch", user.user_id), 10, 0.5)?;

    let ride = state.engine.ride(ride_id).await?;
    if UserId::from(ride.rider_id) != user.user_id {
        return Err(AppError::Forbidden(
            "ride belongs to another user".to_string(),
        ));
    }

    let outcome = state.engine.dispatch(ride_id).await?;
    Ok(Json(DispatchSummary::from(&outcome)))
}

pub async fn get_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<types::ride::Ride>, AppError> {
    let ride = state.engine.ride(ride_id).await?;

    // Only the requester and the assigned driver may read a ride.
    let is_rider = UserId::from(ride.rider_id) == user.user_id;
    let is_driver = ride.driver_id.map(UserId::from) == Some(user.user_id);
    if !is_rider && !is_driver {
        return Err(AppError::Forbidden(
            "ride belongs to another user".to_string(),
        ));
    }

    Ok(Json(ride))
}

pub async fn cancel_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
    Json(payload): Json<CancelRideRequest>,
) -> Result<Json<types::ride::Ride>, AppError> {
    let actor = match user.role {
        Role::Rider => CancelActor::Rider,
        Role::Driver => CancelActor::Driver,
    };
    let ride = state
        .engine
        .cancel_ride(ride_id, actor, Some(user.user_id), payload.reason)
        .await?;
    Ok(Json(ride))
}

pub async fn mark_arrived(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<types::ride::Ride>, AppError> {
    let driver_id = user.driver_id()?;
    let ride = state.engine.mark_arrived(ride_id, driver_id).await?;
    Ok(Json(ride))
}

pub async fn start_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<types::ride::Ride>, AppError> {
    let driver_id = user.driver_id()?;
    let ride = state.engine.start_ride(ride_id, driver_id).await?;
    Ok(Json(ride))
}

pub async fn complete_ride(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ride_id): Path<RideId>,
) -> Result<Json<types::ride::Ride>, AppError> {
    let driver_id = user.driver_id()?;
    let ride = state.engine.complete_ride(ride_id, driver_id).await?;
    Ok(Json(ride))
}
