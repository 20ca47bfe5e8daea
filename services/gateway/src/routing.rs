//! Routing provider client
//!
//! Fetches driving distance/duration from an OSRM-compatible service for
//! fare quoting. Any failure here is survivable: the engine falls back to
//! great-circle distance, so this client only maps errors, it never
//! panics or retries.

use async_trait::async_trait;
use dispatch_engine::ports::{RouteEstimate, RouteEstimator, StoreError};
use reqwest::Client;
use serde::Deserialize;
use types::geo::Coordinate;

pub struct OsrmRoutes {
    base_url: String,
    client: Client,
}

impl OsrmRoutes {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
}

#[async_trait]
impl RouteEstimator for OsrmRoutes {
    async fn estimate(
        &self,
        pickup: Coordinate,
        dropoff: Coordinate,
    ) -> Result<RouteEstimate, StoreError> {
        // OSRM takes lon,lat pairs.
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.base_url, pickup.lon, pickup.lat, dropoff.lon, dropoff.lat
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("routing request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "routing service returned {}",
                response.status()
            )));
        }

        let body: OsrmResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("routing response invalid: {e}")))?;

        let route = body
            .routes
            .first()
            .ok_or_else(|| StoreError::Unavailable("routing returned no route".to_string()))?;

        Ok(RouteEstimate {
            distance_km: route.distance / 1000.0,
            duration_mins: route.duration / 60.0,
        })
    }
}
