//! Core type definitions for the ride dispatch platform
//!
//! Shared by the dispatch engine and the gateway:
//! - Time-sortable UUID v7 identifiers
//! - Geographic coordinates with great-circle distance
//! - Ride and dispatch-attempt records with lifecycle timestamps
//! - Driver availability snapshots
//! - The typed real-time event protocol
//! - The dispatch error taxonomy

pub mod attempt;
pub mod driver;
pub mod errors;
pub mod events;
pub mod fare;
pub mod geo;
pub mod ids;
pub mod ride;
