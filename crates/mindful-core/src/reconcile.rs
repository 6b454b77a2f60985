//! Expiry reconciliation

use chrono::{DateTime, Local};
use mindful_api::{Grant, Notification};
use mindful_host_api::HostEffects;
use mindful_store::{ClaimOutcome, LogEntry, LogEvent, Store};
use mindful_util::{Clock, CorrelationName};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreResult, PolicyEngine, ProcessRole};

/// What a call to [`Reconciler::reconcile_expiry`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No record: another path already reconciled it (or it never existed)
    Absent,
    /// Spurious early fire; the grant is still active
    NotYetExpired { expires_at: DateTime<Local> },
    /// This call removed the grant and reapplied the policy
    Reconciled(Grant),
    /// Another caller claimed the grant between our read and our claim
    LostClaim,
}

impl ReconcileOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, ReconcileOutcome::Reconciled(_))
    }
}

/// Reblocks expired grants. Idempotent and safe to race against other
/// reconcilers in this or any other process.
pub struct Reconciler {
    store: Arc<dyn Store>,
    policy: Arc<PolicyEngine>,
    host: HostEffects,
    clock: Arc<dyn Clock>,
    role: ProcessRole,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<PolicyEngine>,
        host: HostEffects,
        clock: Arc<dyn Clock>,
        role: ProcessRole,
    ) -> Self {
        Self {
            store,
            policy,
            host,
            clock,
            role,
        }
    }

    /// Reconcile one grant by its correlation name.
    ///
    /// Only the caller that wins the store claim removes the record, reapplies
    /// the policy and sends the "time's up" notification. Removal always
    /// happens before the policy is reapplied.
    pub async fn reconcile_expiry(&self, correlation: &CorrelationName) -> CoreResult<ReconcileOutcome> {
        let now = self.clock.now();

        let Some(grant) = self.store.get_grant(correlation)? else {
            debug!(correlation = %correlation, "No grant to reconcile");
            return Ok(ReconcileOutcome::Absent);
        };

        if grant.is_active(now) {
            debug!(
                correlation = %correlation,
                expires_at = %grant.expires_at,
                "Grant not yet expired"
            );
            return Ok(ReconcileOutcome::NotYetExpired {
                expires_at: grant.expires_at,
            });
        }

        let grant = match self.store.claim_grant(correlation, now)? {
            ClaimOutcome::Claimed(grant) => grant,
            ClaimOutcome::AlreadyClaimed => {
                debug!(correlation = %correlation, "Lost reconciliation claim");
                return Ok(ReconcileOutcome::LostClaim);
            }
            ClaimOutcome::Vanished => return Ok(ReconcileOutcome::Absent),
        };

        // The record is gone; whatever happens below, the next full
        // recomputation blocks the item.
        if let Err(e) = self.policy.apply(now).await {
            warn!(correlation = %correlation, error = %e, "Reblock failed");
        }

        if let Err(e) = self
            .host
            .notifier
            .notify(&Notification::reblocked(&grant.display_name))
            .await
        {
            debug!(error = %e, "Reblock notification not delivered");
        }

        if self.role == ProcessRole::Main
            && let Err(e) = self.host.scheduler.stop_monitoring(correlation).await
        {
            debug!(correlation = %correlation, error = %e, "Could not stop monitoring");
        }

        let _ = self.store.append_log(LogEntry::new(
            self.role.as_str(),
            LogEvent::GrantReconciled {
                correlation: correlation.clone(),
            },
        ));

        info!(
            correlation = %correlation,
            item = %grant.display_name,
            role = self.role.as_str(),
            "Grant expired, item blocked again"
        );
        Ok(ReconcileOutcome::Reconciled(grant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, minutes_after, t0, token};
    use crate::ProcessRole;
    use mindful_api::NotificationKind;

    #[tokio::test]
    async fn absent_grant_is_a_no_op() {
        let fx = Fixture::new(&["a"]);
        let name = CorrelationName::for_grant();

        let outcome = fx.components.reconciler.reconcile_expiry(&name).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(fx.host.enforcer.apply_count(), 0);
        assert!(fx.host.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn early_fire_is_a_no_op() {
        let fx = Fixture::new(&["a"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(9));

        let outcome = fx
            .components
            .reconciler
            .reconcile_expiry(&grant.correlation)
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::NotYetExpired { .. }));
        assert!(fx.store.get_grant(&grant.correlation).unwrap().is_some());
        assert_eq!(fx.host.enforcer.apply_count(), 0);
    }

    #[tokio::test]
    async fn expired_grant_is_removed_then_reblocked() {
        let fx = Fixture::new(&["a", "b"]);
        let grant = Grant::new(token("a"), "Maps", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(11));

        let outcome = fx
            .components
            .reconciler
            .reconcile_expiry(&grant.correlation)
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Reconciled(grant.clone()));
        assert!(fx.store.list_grants().unwrap().is_empty());
        assert!(fx.host.enforcer.last_applied().unwrap().contains(&token("a")));

        let sent = fx.host.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Reblocked);
        assert_eq!(sent[0].body, "Maps has been blocked again.");

        // The main process also tears down the OS trigger
        assert_eq!(fx.host.scheduler.stopped(), vec![grant.correlation]);
    }

    #[tokio::test]
    async fn reconciling_twice_changes_nothing() {
        let fx = Fixture::new(&["a"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(11));

        let reconciler = &fx.components.reconciler;
        assert!(reconciler.reconcile_expiry(&grant.correlation).await.unwrap().is_reconciled());
        let applied = fx.host.enforcer.apply_count();

        let second = reconciler.reconcile_expiry(&grant.correlation).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Absent);
        assert_eq!(fx.host.enforcer.apply_count(), applied);
        assert_eq!(fx.host.notifier.count(NotificationKind::Reblocked), 1);
    }

    #[tokio::test]
    async fn reblock_survives_enforcer_failure() {
        let fx = Fixture::new(&["a"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        fx.store.put_grant(&grant).unwrap();
        fx.clock.set(minutes_after(11));
        fx.host.enforcer.set_fail(true);

        let outcome = fx
            .components
            .reconciler
            .reconcile_expiry(&grant.correlation)
            .await
            .unwrap();
        assert!(outcome.is_reconciled());
        assert!(fx.store.list_grants().unwrap().is_empty());

        // Any later full recomputation includes the item again
        fx.host.enforcer.set_fail(false);
        let blocked = fx.components.policy.apply(fx.clock.now()).await.unwrap();
        assert!(blocked.contains(&token("a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_triggers_reblock_exactly_once() {
        let main = Fixture::new(&["a", "b"]);
        let monitor = main.sibling(ProcessRole::Monitor);

        for round in 0..20 {
            let grant = Grant::new(token("a"), "A", 10, "", main.clock.now());
            main.store.put_grant(&grant).unwrap();
            main.clock.set(grant.expires_at + chrono::Duration::seconds(1));

            let timer = main.components.reconciler.clone();
            let os_trigger = monitor.components.reconciler.clone();
            let (c1, c2) = (grant.correlation.clone(), grant.correlation.clone());
            let first = tokio::spawn(async move { timer.reconcile_expiry(&c1).await });
            let second = tokio::spawn(async move { os_trigger.reconcile_expiry(&c2).await });

            let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
            let winners = outcomes.iter().filter(|o| o.is_reconciled()).count();
            assert_eq!(winners, 1, "round {round}: {outcomes:?}");

            assert!(main.store.list_grants().unwrap().is_empty());
            assert!(main.host.enforcer.last_applied().unwrap().contains(&token("a")));
        }

        let notified = main.host.notifier.count(NotificationKind::Reblocked)
            + monitor.host.notifier.count(NotificationKind::Reblocked);
        assert_eq!(notified, 20);
    }
}
