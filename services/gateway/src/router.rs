use crate::handlers::{driver, ride, ws};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/rides", post(ride::create_ride))
        .route("/rides/{id}", get(ride::get_ride))
        .route("/rides/{id}/dispatch", post(ride::redispatch))
        .route("/rides/{id}/cancel", post(ride::cancel_ride))
        .route("/rides/{id}/arrived", post(ride::mark_arrived))
        .route("/rides/{id}/start", post(ride::start_ride))
        .route("/rides/{id}/complete", post(ride::complete_ride))
        .route("/drivers", post(driver::register_driver))
        .route("/drivers/presence", put(driver::update_presence))
        .route("/attempts/{id}/respond", post(driver::respond))
        .route("/surge", get(driver::surge))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
