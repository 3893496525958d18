//! Comms planner: cheapest compliant channel selection for customer letters.

pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod planning;
