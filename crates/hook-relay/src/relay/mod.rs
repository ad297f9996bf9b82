//! Outbound relay: sequential fan-out and correlation ids.

pub mod correlation;
pub mod forward;
