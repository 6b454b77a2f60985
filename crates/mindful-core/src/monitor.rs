//! OS-scheduled monitor callbacks

use mindful_api::{LifecycleCallback, Notification};
use mindful_host_api::HostEffects;
use mindful_store::Store;
use mindful_util::{Clock, CorrelationName};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{CoreResult, PolicyEngine, ReconcileOutcome, Reconciler};

/// What the monitor process did for one callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The interval ended and the grant was looked up
    Reconciled(ReconcileOutcome),
    /// The interval ended for a grant that is already gone; the full policy
    /// was reapplied anyway
    SafetyNet,
    /// A pre-expiry warning went out
    Warned { remaining_minutes: u64 },
    /// Nothing left to warn about
    NoWarning,
}

/// Runs in the short-lived monitor process. Everything is rediscovered
/// from the store.
pub struct MonitorHandler {
    store: Arc<dyn Store>,
    policy: Arc<PolicyEngine>,
    reconciler: Arc<Reconciler>,
    host: HostEffects,
    clock: Arc<dyn Clock>,
}

impl MonitorHandler {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<PolicyEngine>,
        reconciler: Arc<Reconciler>,
        host: HostEffects,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            reconciler,
            host,
            clock,
        }
    }

    pub async fn handle(&self, callback: LifecycleCallback) -> CoreResult<MonitorOutcome> {
        match callback {
            LifecycleCallback::IntervalEnded { correlation } => {
                self.interval_ended(&correlation).await
            }
            LifecycleCallback::IntervalWillEndSoon { correlation } => {
                self.interval_will_end(&correlation).await
            }
        }
    }

    async fn interval_ended(&self, correlation: &CorrelationName) -> CoreResult<MonitorOutcome> {
        let outcome = self.reconciler.reconcile_expiry(correlation).await?;
        if outcome != ReconcileOutcome::Absent {
            return Ok(MonitorOutcome::Reconciled(outcome));
        }

        debug!(correlation = %correlation, "No grant left; reapplying full policy");
        self.policy.apply(self.clock.now()).await?;
        Ok(MonitorOutcome::SafetyNet)
    }

    async fn interval_will_end(&self, correlation: &CorrelationName) -> CoreResult<MonitorOutcome> {
        let now = self.clock.now();
        let Some(grant) = self.store.get_grant(correlation)? else {
            return Ok(MonitorOutcome::NoWarning);
        };
        if !grant.is_active(now) {
            return Ok(MonitorOutcome::NoWarning);
        }

        let remaining_minutes = grant.remaining(now).as_secs().div_ceil(60);
        let warning = Notification::expiry_warning(&grant.display_name, remaining_minutes);
        if let Err(e) = self.host.notifier.notify(&warning).await {
            debug!(error = %e, "Warning not delivered");
        }
        info!(correlation = %correlation, remaining_minutes, "Expiry warning sent");
        Ok(MonitorOutcome::Warned { remaining_minutes })
    }
}
