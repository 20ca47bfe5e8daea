//! Dispatch & Ride-State Engine
//!
//! Assigns incoming transportation requests to drivers from a
//! geographically distributed pool, notifies the chosen driver in real
//! time, resolves accept/decline races, and escalates to alternates on
//! rejection or timeout.
//!
//! **Key Invariants:**
//! - At most one acceptance ever commits per ride
//! - At most one dispatch attempt per ride is outstanding at any instant
//! - A driver is never offered the same ride twice
//! - The search radius never decreases across rounds and never exceeds
//!   the configured cap
//! - Every status change passes the lifecycle transition table first
//!
//! The engine owns no storage and no transport; it talks to them through
//! the ports in [`ports`], which the gateway wires to its connection
//! registry and the configured persistence backend.

pub mod candidates;
pub mod config;
pub mod engine;
pub mod fare;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod surge;

pub use engine::{DispatchEngine, DispatchOutcome, RespondOutcome, RideRequest};
