//! Shared utilities for curfewd
//!
//! This crate provides:
//! - ID types (StudentId, SemesterId, PenaltyId, StayRequestId)
//! - Time utilities (mockable clock, service-timezone day arithmetic)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
