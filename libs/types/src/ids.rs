//! Unique identifier types for dispatch entities
//!
//! All IDs use UUID v7 for time-sortable ordering, enabling efficient
//! chronological queries over rides and dispatch attempts.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new id with the current timestamp
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a ride (one transportation request)
    RideId
}

uuid_id! {
    /// Unique identifier for a dispatch attempt (one offer of a ride to one driver)
    AttemptId
}

uuid_id! {
    /// Unique identifier for a driver
    DriverId
}

uuid_id! {
    /// Unique identifier for a rider (the requesting party)
    RiderId
}

uuid_id! {
    /// Authenticated user identity, as the auth layer and connection registry
    /// see it. Riders and drivers are both users.
    UserId
}

impl From<DriverId> for UserId {
    fn from(id: DriverId) -> Self {
        UserId(id.0)
    }
}

impl From<RiderId> for UserId {
    fn from(id: RiderId) -> Self {
        UserId(id.0)
    }
}

impl From<UserId> for DriverId {
    fn from(id: UserId) -> Self {
        DriverId(id.0)
    }
}

impl From<UserId> for RiderId {
    fn from(id: UserId) -> Self {
        RiderId(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ride_id_creation() {
        let id1 = RideId::new();
        let id2 = RideId::new();
        assert_ne!(id1, id2, "RideIds should be unique");
    }

    #[test]
    fn test_ride_id_serialization() {
        let id = RideId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: RideId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_attempt_id_creation() {
        let id1 = AttemptId::new();
        let id2 = AttemptId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_driver_identity_roundtrip() {
        let driver = DriverId::new();
        let user: UserId = driver.into();
        let back: DriverId = user.into();
        assert_eq!(driver, back);
    }

    #[test]
    fn test_ids_are_time_sortable() {
        let earlier = RideId::new();
        let later = RideId::new();
        assert!(earlier.as_uuid() <= later.as_uuid());
    }
}
