//! Ride lifecycle state machine
//!
//! A pure transition table over `RideStatus`. Every status mutation in the
//! engine calls `validate_transition` before committing; callers stamp the
//! timestamp matching the target state as part of the same update. Terminal
//! states have no outgoing transitions.

use types::errors::DispatchError;
use types::ride::RideStatus;

/// Validate a proposed status transition.
///
/// Returns `Ok(())` when the transition is in the table, otherwise an
/// `IllegalTransition` error naming both states. Pure: no side effects,
/// independent of who requests the transition.
pub fn validate_transition(current: RideStatus, proposed: RideStatus) -> Result<(), DispatchError> {
    use RideStatus::*;

    let allowed = match current {
        Pending => matches!(
            proposed,
            Accepted | CancelledByRider | CancelledBySystem | Expired
        ),
        Accepted => matches!(
            proposed,
            DriverArrived | CancelledByRider | CancelledByDriver | CancelledBySystem
        ),
        DriverArrived => matches!(
            proposed,
            Started | CancelledByRider | CancelledByDriver | CancelledBySystem
        ),
        Started => matches!(proposed, Completed | CancelledBySystem),
        // Terminal states
        Completed | CancelledByRider | CancelledByDriver | CancelledBySystem | Expired => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(DispatchError::IllegalTransition {
            from: current,
            to: proposed,
        })
    }
}
