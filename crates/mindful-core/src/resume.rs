//! Startup/resume reconciliation

use mindful_store::Store;
use mindful_util::{Clock, to_chrono};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{CoreResult, PolicyEngine, ReblockTimers, Reconciler};

/// What one pass of [`ResumeReconciler::reconcile_all`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    pub reconciled: usize,
    pub rearmed: usize,
    pub pruned_claims: usize,
}

impl ResumeSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Closes whatever the triggers missed: run at startup, on resume from
/// suspension and periodically.
pub struct ResumeReconciler {
    store: Arc<dyn Store>,
    policy: Arc<PolicyEngine>,
    reconciler: Arc<Reconciler>,
    timers: ReblockTimers,
    clock: Arc<dyn Clock>,
    claim_retention: Duration,
}

impl ResumeReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<PolicyEngine>,
        reconciler: Arc<Reconciler>,
        timers: ReblockTimers,
        clock: Arc<dyn Clock>,
        claim_retention: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            reconciler,
            timers,
            clock,
            claim_retention,
        }
    }

    /// Reblock every expired grant, re-arm timers for active grants this
    /// process does not know about, then reapply the full policy.
    ///
    /// The final apply covers a trigger that claimed a grant and died before
    /// reapplying: its grant is hidden from reads and only a full recompute
    /// blocks the item again.
    pub async fn reconcile_all(&self) -> CoreResult<ResumeSummary> {
        let now = self.clock.now();
        let mut summary = ResumeSummary::default();

        for grant in self.store.list_grants()? {
            if grant.is_active(now) {
                if !self.timers.is_armed(&grant.correlation) {
                    debug!(correlation = %grant.correlation, "Re-arming timer");
                    self.timers.arm(&grant.correlation, grant.expires_at);
                    summary.rearmed += 1;
                }
                continue;
            }

            self.timers.cancel(&grant.correlation);
            match self.reconciler.reconcile_expiry(&grant.correlation).await {
                Ok(outcome) if outcome.is_reconciled() => summary.reconciled += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(correlation = %grant.correlation, error = %e, "Reconciliation failed");
                }
            }
        }

        if let Err(e) = self.policy.apply(now).await {
            warn!(error = %e, "Policy reapply failed");
        }

        match self.store.prune_claims(now - to_chrono(self.claim_retention)) {
            Ok(pruned) => summary.pruned_claims = pruned,
            Err(e) => warn!(error = %e, "Could not prune claim markers"),
        }

        if !summary.is_noop() {
            info!(
                reconciled = summary.reconciled,
                rearmed = summary.rearmed,
                pruned_claims = summary.pruned_claims,
                "Resume reconciliation"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, minutes_after, t0, token};
    use mindful_api::{Grant, NotificationKind};

    #[tokio::test]
    async fn expired_grants_are_reblocked_and_active_ones_rearmed() {
        let fx = Fixture::new(&["a", "b", "c"]);
        let expired = Grant::new(token("a"), "A", 10, "", t0());
        let active = Grant::new(token("b"), "B", 60, "", t0());
        fx.store.put_grant(&expired).unwrap();
        fx.store.put_grant(&active).unwrap();
        fx.clock.set(minutes_after(11));

        let summary = fx.components.resume.reconcile_all().await.unwrap();
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.rearmed, 1);

        assert_eq!(fx.store.list_grants().unwrap(), vec![active.clone()]);
        assert!(fx.components.timers.is_armed(&active.correlation));
        assert!(!fx.components.timers.is_armed(&expired.correlation));

        let blocked = fx.host.enforcer.last_applied().unwrap();
        assert!(blocked.contains(&token("a")));
        assert!(!blocked.contains(&token("b")));
        assert_eq!(fx.host.notifier.count(NotificationKind::Reblocked), 1);
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let fx = Fixture::new(&["a", "b"]);
        fx.store
            .put_grant(&Grant::new(token("a"), "A", 10, "", t0()))
            .unwrap();
        fx.store
            .put_grant(&Grant::new(token("b"), "B", 60, "", t0()))
            .unwrap();
        fx.clock.set(minutes_after(11));

        let resume = &fx.components.resume;
        assert!(!resume.reconcile_all().await.unwrap().is_noop());

        let blocked = fx.host.enforcer.last_applied().unwrap();
        let second = resume.reconcile_all().await.unwrap();
        assert!(second.is_noop());
        assert_eq!(fx.host.enforcer.last_applied().unwrap(), blocked);
        assert_eq!(fx.host.notifier.count(NotificationKind::Reblocked), 1);
    }

    #[tokio::test]
    async fn grant_persisted_without_timer_still_reblocks() {
        // Process died right after persisting
        let fx = Fixture::new(&["a"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();

        let restarted = fx.sibling(crate::ProcessRole::Main);
        restarted.clock.set(minutes_after(15));
        let summary = restarted.components.resume.reconcile_all().await.unwrap();

        assert_eq!(summary.reconciled, 1);
        assert!(fx.store.list_grants().unwrap().is_empty());
        assert!(fx.host.enforcer.last_applied().unwrap().contains(&token("a")));
    }

    #[tokio::test]
    async fn claim_without_reapply_is_repaired() {
        // A trigger claimed the grant and died before reapplying
        let fx = Fixture::new(&["a", "b"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(11));
        fx.store.claim_grant(&grant.correlation, fx.clock.now()).unwrap();
        assert!(fx.store.list_grants().unwrap().is_empty());
        assert_eq!(fx.host.enforcer.apply_count(), 0);

        let restarted = fx.sibling(crate::ProcessRole::Main);
        let summary = restarted.components.resume.reconcile_all().await.unwrap();

        assert_eq!(summary.reconciled, 0);
        let blocked = fx.host.enforcer.last_applied().unwrap();
        assert!(blocked.contains(&token("a")));
        assert!(blocked.contains(&token("b")));
    }

    #[tokio::test]
    async fn old_claim_markers_are_pruned() {
        let fx = Fixture::new(&["a"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(11));
        fx.components
            .reconciler
            .reconcile_expiry(&grant.correlation)
            .await
            .unwrap();

        let resume = &fx.components.resume;
        assert_eq!(resume.reconcile_all().await.unwrap().pruned_claims, 0);

        fx.clock.set(minutes_after(11 + 25 * 60));
        assert_eq!(resume.reconcile_all().await.unwrap().pruned_claims, 1);
    }
}
