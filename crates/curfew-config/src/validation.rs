//! Configuration validation

use crate::schema::{RawConfig, RawCurfewConfig, RawRetryConfig, RawServiceConfig};
use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid time format '{value}' for {field}: {message}")]
    InvalidTimeFormat {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Invalid timezone '{value}': {message}")]
    InvalidTimezone { value: String, message: String },

    #[error("{field} must be greater than zero")]
    ZeroPoints { field: &'static str },

    #[error("Retry config error: {0}")]
    RetryError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_service(&config.service));
    errors.extend(validate_curfew(&config.curfew));
    errors.extend(validate_retry(&config.retry));

    errors
}

fn validate_service(service: &RawServiceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(tz) = &service.timezone
        && let Err(e) = parse_utc_offset(tz)
    {
        errors.push(ValidationError::InvalidTimezone {
            value: tz.clone(),
            message: e,
        });
    }

    if let Some(run_at) = &service.run_at
        && let Err(e) = parse_time(run_at)
    {
        errors.push(ValidationError::InvalidTimeFormat {
            field: "service.run_at",
            value: run_at.clone(),
            message: e,
        });
    }

    errors
}

fn validate_curfew(curfew: &RawCurfewConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(time) = &curfew.time
        && let Err(e) = parse_time(time)
    {
        errors.push(ValidationError::InvalidTimeFormat {
            field: "curfew.time",
            value: time.clone(),
            message: e,
        });
    }

    if curfew.unexcused_absence_points == Some(0) {
        errors.push(ValidationError::ZeroPoints {
            field: "curfew.unexcused_absence_points",
        });
    }
    if curfew.late_entry_points == Some(0) {
        errors.push(ValidationError::ZeroPoints {
            field: "curfew.late_entry_points",
        });
    }

    errors
}

fn validate_retry(retry: &RawRetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if retry.max_attempts == Some(0) {
        errors.push(ValidationError::RetryError(
            "max_attempts must be at least 1".into(),
        ));
    }

    if let (Some(initial), Some(max)) = (retry.initial_backoff_seconds, retry.max_backoff_seconds)
        && initial > max
    {
        errors.push(ValidationError::RetryError(format!(
            "initial_backoff_seconds ({}) exceeds max_backoff_seconds ({})",
            initial, max
        )));
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

/// Largest offset in use anywhere (UTC+14:00 / UTC-14:00)
const MAX_UTC_OFFSET_SECS: i32 = 14 * 3600;

/// Parse a fixed UTC offset (`+HH:MM`, `-HH:MM`, `Z` or `UTC`)
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let offset: FixedOffset = s
        .parse()
        .map_err(|_| "Expected +HH:MM or -HH:MM".to_string())?;

    // chrono ignores trailing input and accepts +HHMM; only the canonical form is valid here
    if offset.to_string() != s {
        return Err("Expected +HH:MM or -HH:MM".into());
    }
    if offset.local_minus_utc().abs() > MAX_UTC_OFFSET_SECS {
        return Err("Offset must be within ±14:00".into());
    }

    Ok(offset)
}
