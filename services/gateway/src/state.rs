use crate::auth::AuthKeys;
use crate::rate_limit::RateLimiter;
use crate::registry::ConnectionRegistry;
use crate::routing::OsrmRoutes;
use async_trait::async_trait;
use dispatch_engine::DispatchEngine;
use dispatch_engine::config::EngineConfig;
use dispatch_engine::memory::MemoryStore;
use dispatch_engine::ports::PromoLookup;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Startup configuration, read from the environment by `main`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub routing_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: "dev-secret".to_string(),
            routing_url: "http://localhost:5000".to_string(),
        }
    }
}

/// Promo provider boundary with nothing configured: every code misses.
struct NoPromoCodes;

#[async_trait]
impl PromoLookup for NoPromoCodes {
    async fn discount(&self, _code: &str) -> Option<Decimal> {
        None
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
    pub registry: Arc<ConnectionRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthKeys>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let routes = Arc::new(OsrmRoutes::new(config.routing_url));
        let engine = DispatchEngine::new(
            store,
            registry.clone(),
            routes,
            Arc::new(NoPromoCodes),
            EngineConfig::default(),
        );

        Self {
            engine,
            registry,
            rate_limiter: Arc::new(RateLimiter::new()),
            auth: Arc::new(AuthKeys::from_secret(&config.jwt_secret)),
        }
    }
}
