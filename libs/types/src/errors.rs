//! Error taxonomy for the dispatch engine
//!
//! Five terminal classes plus one retryable class. Not-found, precondition,
//! authorization, and already-responded failures are reported to the caller
//! verbatim; transient dependency failures are retried a bounded number of
//! times at the boundary before surfacing.

use crate::ids::AttemptId;
use crate::ride::RideStatus;
use std::fmt;
use thiserror::Error;

/// Which kind of record a not-found error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Ride,
    Attempt,
    Driver,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Entity::Ride => "ride",
            Entity::Attempt => "attempt",
            Entity::Driver => "driver",
        };
        write!(f, "{s}")
    }
}

/// Dispatch engine error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// A referenced ride/attempt/driver does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// A proposed status change is not in the lifecycle transition table
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: RideStatus, to: RideStatus },

    /// The ride is not in the status the requested operation expects
    #[error("ride is {actual}, expected {expected}")]
    UnexpectedStatus {
        expected: RideStatus,
        actual: RideStatus,
    },

    /// The responding identity does not own the referenced record
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Duplicate response to an attempt; the first response stands
    #[error("attempt already responded: {attempt_id}")]
    AlreadyResponded { attempt_id: AttemptId },

    /// Persistence or transport temporarily unavailable after bounded retries
    #[error("transient dependency failure: {0}")]
    Transient(String),
}

impl DispatchError {
    pub fn ride_not_found(id: impl fmt::Display) -> Self {
        DispatchError::NotFound {
            entity: Entity::Ride,
            id: id.to_string(),
        }
    }

    pub fn attempt_not_found(id: impl fmt::Display) -> Self {
        DispatchError::NotFound {
            entity: Entity::Attempt,
            id: id.to_string(),
        }
    }

    pub fn driver_not_found(id: impl fmt::Display) -> Self {
        DispatchError::NotFound {
            entity: Entity::Driver,
            id: id.to_string(),
        }
    }
}
