//! Notifications and host lifecycle callbacks

use mindful_util::CorrelationName;
use serde::{Deserialize, Serialize};

/// Kind of advisory notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Shield button pressed; asks the user to explain the request
    UnlockRequest,
    /// A grant is about to run out
    ExpiryWarning,
    /// A grant ran out and its item is blocked again
    Reblocked,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::UnlockRequest => "unlock-request",
            NotificationKind::ExpiryWarning => "expiry-warning",
            NotificationKind::Reblocked => "reblocked",
        }
    }
}

/// Fire-and-forget notification content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn unlock_request(display_name: &str) -> Self {
        Self::new(
            NotificationKind::UnlockRequest,
            "Mindful",
            format!("Tap to explain why you need {}", display_name),
        )
    }

    pub fn expiry_warning(display_name: &str, lead_minutes: u64) -> Self {
        Self::new(
            NotificationKind::ExpiryWarning,
            format!("{} minutes remaining", lead_minutes),
            format!("{} will be blocked again soon.", display_name),
        )
    }

    pub fn reblocked(display_name: &str) -> Self {
        Self::new(
            NotificationKind::Reblocked,
            "Time's up",
            format!("{} has been blocked again.", display_name),
        )
    }
}

/// Callbacks the host delivers to the monitor process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleCallback {
    IntervalEnded { correlation: CorrelationName },
    IntervalWillEndSoon { correlation: CorrelationName },
}

impl LifecycleCallback {
    pub fn correlation(&self) -> &CorrelationName {
        match self {
            LifecycleCallback::IntervalEnded { correlation }
            | LifecycleCallback::IntervalWillEndSoon { correlation } => correlation,
        }
    }
}
