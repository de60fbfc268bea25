//! Reconciliation core for curfewd
//!
//! This crate turns one night's raw data into penalties:
//! - Semester resolution (which roster applies to a date)
//! - Latest-entry reduction over the day's entry events
//! - Per-student classification into compliant, absent or late
//! - Run orchestration: concurrent fetch, decide, atomic commit

mod decision;
mod error;
mod reconciler;
mod reducer;
mod semester;

pub use decision::*;
pub use error::*;
pub use reconciler::*;
pub use reducer::*;
pub use semester::*;
