mod auth;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod registry;
mod router;
mod routing;
mod state;

use router::create_router;
use state::{AppState, GatewayConfig};
use tokio::net::TcpListener;

fn config_from_env() -> GatewayConfig {
    let defaults = GatewayConfig::default();
    GatewayConfig {
        bind_addr: std::env::var("GATEWAY_ADDR").unwrap_or(defaults.bind_addr),
        jwt_secret: std::env::var("GATEWAY_JWT_SECRET").unwrap_or(defaults.jwt_secret),
        routing_url: std::env::var("ROUTING_URL").unwrap_or(defaults.routing_url),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting dispatch gateway");

    let config = config_from_env();
    let addr = config.bind_addr.clone();
    let state = AppState::new(config);

    let app = create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
