use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use types::ids::{DriverId, RiderId, UserId};

/// Which side of the marketplace a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub user_id: UserId,
    pub role: Role,
}

/// JWT key material, read once at startup. Token issuance lives with the
/// session service; the gateway only verifies.
pub struct AuthKeys {
    pub decoding: DecodingKey,
}

impl AuthKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// The identity a connection or request acts as.
///
/// Authentication happens once per request (or once per WebSocket
/// handshake); the token is accepted from the `Authorization: Bearer`
/// header or a `token` query parameter, whichever is present.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthenticatedUser {
    /// The driver identity, rejecting rider tokens.
    pub fn driver_id(&self) -> Result<DriverId, AppError> {
        match self.role {
            Role::Driver => Ok(DriverId::from(self.user_id)),
            Role::Rider => Err(AppError::Forbidden(
                "this operation requires a driver token".to_string(),
            )),
        }
    }

    /// The rider identity, rejecting driver tokens.
    pub fn rider_id(&self) -> Result<RiderId, AppError> {
        match self.role {
            Role::Rider => Ok(RiderId::from(self.user_id)),
            Role::Driver => Err(AppError::Forbidden(
                "this operation requires a rider token".to_string(),
            )),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

fn query_token(parts: &Parts) -> Option<String> {
    parts.uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).or_else(|| query_token(parts)).ok_or_else(|| {
            AppError::Unauthorized("Missing authentication credentials".to_string())
        })?;

        let token_data = decode::<Claims>(&token, &state.auth.decoding, &Validation::default())
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;

        Ok(AuthenticatedUser {
            user_id: token_data.claims.user_id,
            role: token_data.claims.role,
        })
    }
}
