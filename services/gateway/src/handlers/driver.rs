use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{
    PresenceRequest, RegisterDriverRequest, RespondRequest, RespondResponse, SurgeQuery,
    SurgeResponse,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use dispatch_engine::{DispatchOutcome, RespondOutcome};
use types::driver::DriverSnapshot;
use types::events::RidePhase;
use types::geo::Coordinate;
use types::ids::AttemptId;

pub async fn register_driver(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<StatusCode, AppError> {
    let driver_id = user.driver_id()?;
    // Document/biometric verification happens upstream of token issuance;
    // a driver holding a driver token registers approved.
    state
        .engine
        .register_driver(DriverSnapshot {
            driver_id,
            name: payload.name,
            online: false,
            approved: true,
            location: None,
            vehicle: payload.vehicle,
        })
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn update_presence(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<PresenceRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    let driver_id = user.driver_id()?;
    let driver = state
        .engine
        .update_presence(driver_id, payload.online, payload.location)
        .await?;
    Ok(Json(driver))
}

/// HTTP mirror of the WebSocket `respond` message, for clients without a
/// live socket at answer time.
pub async fn respond(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(attempt_id): Path<AttemptId>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:respond", user.user_id), 20, 2.0)?;

    let driver_id = user.driver_id()?;
    let outcome = state
        .engine
        .respond(attempt_id, driver_id, payload.accepted, payload.reason)
        .await?;

    let response = match outcome {
        RespondOutcome::Assigned(ride) => RespondResponse::Assigned { ride },
        RespondOutcome::Declined { next } => RespondResponse::Declined {
            next: next.map(|outcome| match outcome {
                DispatchOutcome::Dispatched { .. } => RidePhase::Searching,
                DispatchOutcome::NoCandidate => RidePhase::NoDrivers,
                DispatchOutcome::Exhausted => RidePhase::Expired,
            }),
        },
    };
    Ok(Json(response))
}

pub async fn surge(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<SurgeQuery>,
) -> Result<Json<SurgeResponse>, AppError> {
    let multiplier = state
        .engine
        .surge_multiplier(Coordinate::new(query.lat, query.lon))
        .await;
    Ok(Json(SurgeResponse { multiplier }))
}
