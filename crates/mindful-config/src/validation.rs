//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field} must be greater than zero")]
    MustBePositive {
        section: &'static str,
        field: &'static str,
    },

    #[error("Warning lead {lead_seconds}s is not shorter than the longest grant ({max_minutes} min)")]
    WarningExceedsMaxDuration { lead_seconds: u64, max_minutes: u32 },

    #[error("Invalid approval endpoint '{0}': must start with http:// or https://")]
    InvalidEndpoint(String),

    #[error("[{section}] {field} cannot be empty")]
    Empty {
        section: &'static str,
        field: &'static str,
    },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let positive = [
        ("store", "write_timeout_ms", config.store.write_timeout_ms),
        ("store", "claim_retention_hours", config.store.claim_retention_hours),
        ("grants", "min_timer_delay_seconds", config.grants.min_timer_delay_seconds),
        (
            "grants",
            "pending_request_max_age_seconds",
            config.grants.pending_request_max_age_seconds,
        ),
        (
            "grants",
            "max_duration_minutes",
            config.grants.max_duration_minutes.map(u64::from),
        ),
        ("shield", "response_deadline_ms", config.shield.response_deadline_ms),
        ("approval", "timeout_seconds", config.approval.timeout_seconds),
        ("daemon", "resume_interval_seconds", config.daemon.resume_interval_seconds),
    ];
    for (section, field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::MustBePositive { section, field });
        }
    }

    if let (Some(lead), Some(max_minutes)) = (
        config.grants.warning_lead_seconds,
        config.grants.max_duration_minutes,
    ) && max_minutes > 0
        && lead >= u64::from(max_minutes) * 60
    {
        errors.push(ValidationError::WarningExceedsMaxDuration {
            lead_seconds: lead,
            max_minutes,
        });
    }

    if let Some(endpoint) = &config.approval.endpoint
        && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidEndpoint(endpoint.clone()));
    }

    if config
        .host
        .monitor_program
        .as_deref()
        .is_some_and(|p| p.trim().is_empty())
    {
        errors.push(ValidationError::Empty {
            section: "host",
            field: "monitor_program",
        });
    }

    if config
        .shield
        .title
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        errors.push(ValidationError::Empty {
            section: "shield",
            field: "title",
        });
    }

    errors
}
