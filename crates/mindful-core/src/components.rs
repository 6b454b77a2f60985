//! Wiring of the core components for one process

use mindful_config::Config;
use mindful_host_api::{ApprovalService, HostEffects};
use mindful_store::Store;
use mindful_util::Clock;
use std::sync::Arc;

use crate::{
    GrantManager, MonitorHandler, PolicyEngine, ProcessRole, ReblockTimers, Reconciler,
    RequestProcessor, ResumeReconciler, ShieldHandler,
};

/// Every core component of one process, sharing one store, one set of host
/// effects and one clock.
///
/// All three processes build the same graph; the role only changes who
/// stops OS monitoring and how log entries are attributed.
pub struct Components {
    pub role: ProcessRole,
    pub store: Arc<dyn Store>,
    pub host: HostEffects,
    pub clock: Arc<dyn Clock>,
    pub policy: Arc<PolicyEngine>,
    pub reconciler: Arc<Reconciler>,
    pub timers: ReblockTimers,
    pub grants: Arc<GrantManager>,
    pub resume: ResumeReconciler,
    pub shield: ShieldHandler,
    pub monitor: MonitorHandler,
    pub requests: Arc<RequestProcessor>,
}

impl Components {
    pub fn new(
        role: ProcessRole,
        store: Arc<dyn Store>,
        host: HostEffects,
        approval: Arc<dyn ApprovalService>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let policy = Arc::new(PolicyEngine::new(
            store.clone(),
            host.enforcer.clone(),
            role,
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            policy.clone(),
            host.clone(),
            clock.clone(),
            role,
        ));
        let timers = ReblockTimers::new(
            reconciler.clone(),
            clock.clone(),
            config.grants.min_timer_delay,
        );
        let grants = Arc::new(GrantManager::new(
            store.clone(),
            policy.clone(),
            reconciler.clone(),
            timers.clone(),
            host.clone(),
            clock.clone(),
            config.grants.warning_lead,
            role,
        ));
        let resume = ResumeReconciler::new(
            store.clone(),
            policy.clone(),
            reconciler.clone(),
            timers.clone(),
            clock.clone(),
            config.store.claim_retention,
        );
        let shield = ShieldHandler::new(
            store.clone(),
            policy.clone(),
            host.clone(),
            clock.clone(),
            config.shield.clone(),
        );
        let monitor = MonitorHandler::new(
            store.clone(),
            policy.clone(),
            reconciler.clone(),
            host.clone(),
            clock.clone(),
        );
        let requests = Arc::new(RequestProcessor::new(
            store.clone(),
            grants.clone(),
            approval,
            clock.clone(),
            &config.grants,
        ));

        Self {
            role,
            store,
            host,
            clock,
            policy,
            reconciler,
            timers,
            grants,
            resume,
            shield,
            monitor,
            requests,
        }
    }
}
