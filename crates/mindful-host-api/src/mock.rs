//! Mock host effects for testing

use async_trait::async_trait;
use chrono::{DateTime, Local};
use mindful_api::{
    ApprovalDecision, ApprovalRequest, BlockedSet, Notification, NotificationKind,
};
use mindful_util::CorrelationName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{
    ActivityScheduler, ApprovalService, Enforcer, HostEffects, HostError, HostResult,
    MonitorWindow, Notifier,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Enforcer that records every submitted blocked set
#[derive(Default)]
pub struct MockEnforcer {
    applied: Mutex<Vec<BlockedSet>>,

    /// Configure apply_policy to fail
    pub fail: AtomicBool,

    /// Delay before each application completes
    pub delay: Mutex<Option<Duration>>,
}

impl MockEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent blocked set, `None` if no policy was ever applied
    pub fn last_applied(&self) -> Option<BlockedSet> {
        lock(&self.applied).last().cloned()
    }

    /// Every blocked set submitted so far, oldest first
    pub fn history(&self) -> Vec<BlockedSet> {
        lock(&self.applied).clone()
    }

    pub fn apply_count(&self) -> usize {
        lock(&self.applied).len()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }
}

#[async_trait]
impl Enforcer for MockEnforcer {
    async fn apply_policy(&self, blocked: &BlockedSet) -> HostResult<()> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::EnforcementFailed("Mock enforcement failure".into()));
        }
        lock(&self.applied).push(blocked.clone());
        Ok(())
    }
}

/// Scheduler that tracks which triggers are armed
#[derive(Default)]
pub struct MockScheduler {
    active: Mutex<HashMap<CorrelationName, MonitorWindow>>,
    stopped: Mutex<Vec<CorrelationName>>,

    /// Configure start_monitoring to fail
    pub fail: AtomicBool,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_monitoring(&self, correlation: &CorrelationName) -> bool {
        lock(&self.active).contains_key(correlation)
    }

    pub fn window(&self, correlation: &CorrelationName) -> Option<MonitorWindow> {
        lock(&self.active).get(correlation).copied()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Correlation names passed to stop_monitoring, in order
    pub fn stopped(&self) -> Vec<CorrelationName> {
        lock(&self.stopped).clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivityScheduler for MockScheduler {
    async fn start_monitoring(
        &self,
        correlation: &CorrelationName,
        window: MonitorWindow,
    ) -> HostResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::SchedulingFailed("Mock scheduling failure".into()));
        }
        lock(&self.active).insert(correlation.clone(), window);
        Ok(())
    }

    async fn stop_monitoring(&self, correlation: &CorrelationName) -> HostResult<()> {
        lock(&self.active).remove(correlation);
        lock(&self.stopped).push(correlation.clone());
        Ok(())
    }
}

/// Notifier that records what would have been shown
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
    scheduled: Mutex<Vec<(Notification, DateTime<Local>)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn scheduled(&self) -> Vec<(Notification, DateTime<Local>)> {
        lock(&self.scheduled).clone()
    }

    /// Number of immediate notifications of one kind
    pub fn count(&self, kind: NotificationKind) -> usize {
        lock(&self.sent).iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: &Notification) -> HostResult<()> {
        lock(&self.sent).push(notification.clone());
        Ok(())
    }

    async fn schedule(&self, notification: &Notification, at: DateTime<Local>) -> HostResult<()> {
        lock(&self.scheduled).push((notification.clone(), at));
        Ok(())
    }
}

/// Approval service with a canned answer
pub struct MockApprovalService {
    decision: Mutex<ApprovalDecision>,
    requests: Mutex<Vec<ApprovalRequest>>,
    delay: Mutex<Option<Duration>>,

    /// Configure decide to fail
    pub fail: AtomicBool,
}

impl MockApprovalService {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision: Mutex::new(decision),
            requests: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_decision(&self, decision: ApprovalDecision) {
        *lock(&self.decision) = decision;
    }

    /// Take this long to answer, like a slow remote service
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ApprovalService for MockApprovalService {
    async fn decide(&self, request: &ApprovalRequest) -> HostResult<ApprovalDecision> {
        lock(&self.requests).push(request.clone());
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::ApprovalFailed("Mock approval failure".into()));
        }
        Ok(*lock(&self.decision))
    }
}

/// All mock effects of one simulated process
#[derive(Clone)]
pub struct MockHost {
    pub enforcer: Arc<MockEnforcer>,
    pub scheduler: Arc<MockScheduler>,
    pub notifier: Arc<MockNotifier>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            enforcer: Arc::new(MockEnforcer::new()),
            scheduler: Arc::new(MockScheduler::new()),
            notifier: Arc::new(MockNotifier::new()),
        }
    }

    /// Share this mock's state behind the trait objects core components take
    pub fn effects(&self) -> HostEffects {
        HostEffects {
            enforcer: self.enforcer.clone(),
            scheduler: self.scheduler.clone(),
            notifier: self.notifier.clone(),
        }
    }

    /// Another simulated process against the same enforcement mechanism and
    /// scheduler, with its own notifier
    pub fn sibling(&self) -> Self {
        Self {
            enforcer: self.enforcer.clone(),
            scheduler: self.scheduler.clone(),
            notifier: Arc::new(MockNotifier::new()),
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}
