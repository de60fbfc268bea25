//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Curfew rule and penalty points
    #[serde(default)]
    pub curfew: RawCurfewConfig,

    /// Retry policy for a failed reconciliation run
    #[serde(default)]
    pub retry: RawRetryConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Fixed UTC offset of the dormitory, e.g. "+09:00"
    pub timezone: Option<String>,

    /// Daily trigger time (HH:MM)
    pub run_at: Option<String>,
}

/// Curfew rule settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCurfewConfig {
    /// Curfew time (HH:MM); entries strictly after it are late
    pub time: Option<String>,

    /// Points for an unexcused overnight absence
    pub unexcused_absence_points: Option<u32>,

    /// Points for a late entry
    pub late_entry_points: Option<u32>,
}

/// Retry settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetryConfig {
    /// Total attempts per run, including the first
    pub max_attempts: Option<u32>,

    /// Backoff before the second attempt
    pub initial_backoff_seconds: Option<u64>,

    /// Upper bound for any single backoff
    pub max_backoff_seconds: Option<u64>,
}
