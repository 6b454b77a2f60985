//! Host effect traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use mindful_api::{ApprovalDecision, ApprovalRequest, BlockedSet, Notification};
use mindful_util::CorrelationName;
use std::sync::Arc;
use thiserror::Error;

/// Errors from host effects
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Enforcement failed: {0}")]
    EnforcementFailed(String),

    #[error("Scheduling failed: {0}")]
    SchedulingFailed(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Approval service error: {0}")]
    ApprovalFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Interval watched by the OS activity scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

/// The OS-level enforcement mechanism
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Replace the full set of blocked items.
    ///
    /// An empty set means "nothing blocked", which is different from never
    /// having applied a policy at all.
    async fn apply_policy(&self, blocked: &BlockedSet) -> HostResult<()>;
}

/// Schedules the out-of-process expiry trigger.
///
/// When the window ends the host starts the monitor process with the
/// correlation name, even if the main process is gone.
#[async_trait]
pub trait ActivityScheduler: Send + Sync {
    async fn start_monitoring(
        &self,
        correlation: &CorrelationName,
        window: MonitorWindow,
    ) -> HostResult<()>;

    /// Cancel a trigger; stopping an unknown trigger is not an error
    async fn stop_monitoring(&self, correlation: &CorrelationName) -> HostResult<()>;
}

/// Local notification delivery (fire-and-forget)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a notification now
    async fn notify(&self, notification: &Notification) -> HostResult<()>;

    /// Show a notification at `at`, even if this process is gone by then
    async fn schedule(&self, notification: &Notification, at: DateTime<Local>) -> HostResult<()>;
}

/// External decision service
#[async_trait]
pub trait ApprovalService: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> HostResult<ApprovalDecision>;
}

/// Approval service used when none is configured: every request is denied
#[derive(Debug, Default)]
pub struct DenyAllApprovals;

#[async_trait]
impl ApprovalService for DenyAllApprovals {
    async fn decide(&self, _request: &ApprovalRequest) -> HostResult<ApprovalDecision> {
        Ok(ApprovalDecision::denied())
    }
}

/// The host effects every process needs, injected into core components
#[derive(Clone)]
pub struct HostEffects {
    pub enforcer: Arc<dyn Enforcer>,
    pub scheduler: Arc<dyn ActivityScheduler>,
    pub notifier: Arc<dyn Notifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindful_util::ItemToken;

    #[tokio::test]
    async fn deny_all_denies() {
        let request = ApprovalRequest {
            token: ItemToken::from_bytes(b"a").unwrap(),
            display_name: "A".into(),
            justification: "please".into(),
            recent_history: Vec::new(),
        };
        let decision = DenyAllApprovals.decide(&request).await.unwrap();
        assert!(!decision.approve);
        assert_eq!(decision.granted_minutes(), None);
    }
}
