//! Validated policy structures

use crate::schema::{RawConfig, RawCurfewConfig, RawRetryConfig, RawServiceConfig};
use crate::validation::{parse_time, parse_utc_offset};
use chrono::{FixedOffset, Offset, Utc};
use curfew_util::WallClock;
use std::path::PathBuf;
use std::time::Duration;

/// Default dormitory offset (UTC+9)
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Validated policy ready for use by the reconciler and scheduler
#[derive(Debug, Clone, Default)]
pub struct CurfewPolicy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Curfew rule and point values
    pub rules: CurfewRules,

    /// Retry behaviour for failed runs
    pub retry: RetryPolicy,
}

impl CurfewPolicy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            rules: CurfewRules::from_raw(raw.curfew),
            retry: RetryPolicy::from_raw(raw.retry),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    /// Timezone in which "yesterday" and entry timestamps are interpreted
    pub timezone: FixedOffset,
    /// Daily trigger time in `timezone`
    pub run_at: WallClock,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            timezone: raw
                .timezone
                .as_deref()
                .and_then(|tz| parse_utc_offset(tz).ok())
                .unwrap_or(defaults.timezone),
            run_at: raw
                .run_at
                .as_deref()
                .and_then(parse_wall_clock)
                .unwrap_or(defaults.run_at),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: curfew_util::default_data_dir(),
            timezone: default_timezone(),
            run_at: WallClock { hour: 0, minute: 30 },
        }
    }
}

/// The curfew rule applied by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurfewRules {
    /// Entries strictly after this time on the target date are late
    pub curfew: WallClock,
    pub unexcused_absence_points: u32,
    pub late_entry_points: u32,
}

impl CurfewRules {
    fn from_raw(raw: RawCurfewConfig) -> Self {
        let defaults = Self::default();
        Self {
            curfew: raw
                .time
                .as_deref()
                .and_then(parse_wall_clock)
                .unwrap_or(defaults.curfew),
            unexcused_absence_points: raw
                .unexcused_absence_points
                .unwrap_or(defaults.unexcused_absence_points),
            late_entry_points: raw.late_entry_points.unwrap_or(defaults.late_entry_points),
        }
    }
}

impl Default for CurfewRules {
    fn default() -> Self {
        Self {
            curfew: WallClock { hour: 17, minute: 0 },
            unexcused_absence_points: 3,
            late_entry_points: 1,
        }
    }
}

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    fn from_raw(raw: RawRetryConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: raw
                .initial_backoff_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: raw
                .max_backoff_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_backoff),
        }
    }

    /// Delay to wait after the given failed attempt (1-based) before the next one.
    /// Doubles from `initial_backoff`, never exceeding `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

fn default_timezone() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn parse_wall_clock(s: &str) -> Option<WallClock> {
    parse_time(s).ok().and_then(|(h, m)| WallClock::new(h, m))
}
