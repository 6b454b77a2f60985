//! Diagnostic log entries

use chrono::{DateTime, Local};
use mindful_util::CorrelationName;
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// A process started
    ProcessStarted,

    /// A grant was created
    GrantCreated {
        correlation: CorrelationName,
        display_name: String,
        expires_at: DateTime<Local>,
    },

    /// A grant was rejected before anything was written
    GrantRejected { display_name: String, reason: String },

    /// A grant was reconciled (removed and reblocked)
    GrantReconciled { correlation: CorrelationName },

    /// The full blocked set was submitted
    PolicyApplied { blocked: usize },

    /// A trigger could not be armed
    SchedulingFailed {
        correlation: CorrelationName,
        error: String,
    },

    /// The shield recorded a request
    RequestSubmitted { display_name: String },

    /// The approval service decided on a request
    RequestDecided { display_name: String, approved: bool },

    /// An item was exempted from the shield
    ExemptionAdded { display_name: String },

    /// Free-form note
    Note { message: String },
}

/// Full log entry with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,

    /// Which process wrote the entry
    pub process: String,

    pub event: LogEvent,
}

impl LogEntry {
    pub fn new(process: impl Into<String>, event: LogEvent) -> Self {
        Self {
            timestamp: mindful_util::now(),
            process: process.into(),
            event,
        }
    }
}
