//! Policy engine

use chrono::{DateTime, Local};
use mindful_api::{BlockedSet, Grant};
use mindful_host_api::Enforcer;
use mindful_store::{LogEntry, LogEvent, Store};
use mindful_util::ItemToken;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{CoreResult, ProcessRole, with_store};

/// The exact set of items to block at `now`.
///
/// `universe - exemptions - {tokens of grants with expiry > now}`. Dead grants
/// exempt nothing, whether or not their records have been removed yet.
pub fn compute_blocked_set(
    universe: &BTreeSet<ItemToken>,
    exemptions: &BTreeSet<ItemToken>,
    grants: &[Grant],
    now: DateTime<Local>,
) -> BlockedSet {
    let granted: BTreeSet<&ItemToken> = grants
        .iter()
        .filter(|g| g.is_active(now))
        .map(|g| &g.token)
        .collect();

    universe
        .iter()
        .filter(|token| !exemptions.contains(*token) && !granted.contains(token))
        .cloned()
        .collect()
}

/// Everything the blocked set is computed from, read in one pass
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    pub universe: BTreeSet<ItemToken>,
    pub exemptions: BTreeSet<ItemToken>,
    pub grants: Vec<Grant>,
}

impl PolicySnapshot {
    /// Read universe, exemptions and grants from `store`
    pub fn read(store: &dyn Store) -> CoreResult<Self> {
        Ok(Self {
            universe: store.universe()?,
            exemptions: store.exemptions()?,
            grants: store.list_grants()?,
        })
    }

    pub fn blocked(&self, now: DateTime<Local>) -> BlockedSet {
        compute_blocked_set(&self.universe, &self.exemptions, &self.grants, now)
    }
}

/// Computes the blocked set from the store and submits it.
///
/// Applications from one process are sequenced, so a slow application from
/// an old snapshot can never land after a newer one.
pub struct PolicyEngine {
    store: Arc<dyn Store>,
    enforcer: Arc<dyn Enforcer>,
    role: ProcessRole,
    sequence: Mutex<()>,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn Store>, enforcer: Arc<dyn Enforcer>, role: ProcessRole) -> Self {
        Self {
            store,
            enforcer,
            role,
            sequence: Mutex::new(()),
        }
    }

    /// Read universe, exemptions and grants from the store
    pub fn snapshot(&self) -> CoreResult<PolicySnapshot> {
        PolicySnapshot::read(self.store.as_ref())
    }

    async fn load(&self) -> CoreResult<PolicySnapshot> {
        with_store(&self.store, PolicySnapshot::read).await
    }

    /// Take the sequencing lock. Hold the guard across several steps that
    /// must not interleave with other applications from this process.
    pub async fn begin(&self) -> PolicyGuard<'_> {
        PolicyGuard {
            engine: self,
            _sequence: self.sequence.lock().await,
        }
    }

    /// Recompute from scratch and apply
    pub async fn apply(&self, now: DateTime<Local>) -> CoreResult<BlockedSet> {
        self.begin().await.apply(now).await
    }

    /// Recompute from scratch, additionally unblocking `token`, and apply
    pub async fn apply_unblocking(
        &self,
        token: &ItemToken,
        now: DateTime<Local>,
    ) -> CoreResult<BlockedSet> {
        self.begin().await.apply_unblocking(token, now).await
    }

    async fn submit(&self, blocked: BlockedSet) -> CoreResult<BlockedSet> {
        self.enforcer.apply_policy(&blocked).await?;

        let entry = LogEntry::new(
            self.role.as_str(),
            LogEvent::PolicyApplied {
                blocked: blocked.len(),
            },
        );
        let _ = with_store(&self.store, move |store| Ok(store.append_log(entry)?)).await;
        info!(blocked = blocked.len(), role = self.role.as_str(), "Policy applied");
        Ok(blocked)
    }
}

/// Exclusive access to policy application within this process
pub struct PolicyGuard<'a> {
    engine: &'a PolicyEngine,
    _sequence: MutexGuard<'a, ()>,
}

impl PolicyGuard<'_> {
    pub async fn apply(&self, now: DateTime<Local>) -> CoreResult<BlockedSet> {
        let blocked = self.engine.load().await?.blocked(now);
        self.engine.submit(blocked).await
    }

    pub async fn apply_unblocking(
        &self,
        token: &ItemToken,
        now: DateTime<Local>,
    ) -> CoreResult<BlockedSet> {
        let mut blocked = self.engine.load().await?.blocked(now);
        blocked.remove(token);
        debug!(token = %token, "Unblocking item");
        self.engine.submit(blocked).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, t0, token};

    fn set(names: &[&str]) -> BTreeSet<ItemToken> {
        names.iter().map(|n| token(n)).collect()
    }

    #[test]
    fn all_grants_expired_blocks_universe_minus_exemptions() {
        let universe = set(&["a", "b", "c"]);
        let exemptions = set(&["c", "z"]);
        let grants = vec![
            Grant::new(token("a"), "A", 10, "", t0()),
            Grant::new(token("b"), "B", 5, "", t0()),
        ];

        for minutes in [10, 11, 60, 24 * 60] {
            let now = t0() + chrono::Duration::minutes(minutes);
            assert_eq!(
                compute_blocked_set(&universe, &exemptions, &grants, now),
                set(&["a", "b"])
            );
        }
    }

    #[test]
    fn active_grant_is_never_blocked() {
        let universe = set(&["a", "b", "c"]);
        let grants = vec![Grant::new(token("a"), "A", 10, "", t0())];

        for seconds in [0, 1, 60, 599] {
            let now = t0() + chrono::Duration::seconds(seconds);
            let blocked = compute_blocked_set(&universe, &BTreeSet::new(), &grants, now);
            assert!(!blocked.contains(&token("a")));
            assert_eq!(blocked, set(&["b", "c"]));
        }
    }

    #[test]
    fn expiry_is_exclusive() {
        let universe = set(&["a"]);
        let grants = vec![Grant::new(token("a"), "A", 10, "", t0())];
        let at_expiry = t0() + chrono::Duration::minutes(10);
        assert_eq!(
            compute_blocked_set(&universe, &BTreeSet::new(), &grants, at_expiry),
            universe
        );
    }

    #[test]
    fn exemptions_outside_universe_are_ignored() {
        let blocked = compute_blocked_set(&set(&["a"]), &set(&["b"]), &[], t0());
        assert_eq!(blocked, set(&["a"]));
    }

    #[test]
    fn grant_scenario_without_reconciliation() {
        let universe = set(&["a", "b", "c"]);
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        let grants = vec![grant];

        let early = t0() + chrono::Duration::minutes(1);
        assert_eq!(
            compute_blocked_set(&universe, &BTreeSet::new(), &grants, early),
            set(&["b", "c"])
        );

        let late = t0() + chrono::Duration::minutes(11);
        assert_eq!(
            compute_blocked_set(&universe, &BTreeSet::new(), &grants, late),
            set(&["a", "b", "c"])
        );
    }

    #[tokio::test]
    async fn apply_submits_full_set() {
        let fx = Fixture::new(&["a", "b"]);
        fx.store.save_exemptions(&set(&["b"])).unwrap();

        let blocked = fx.components.policy.apply(t0()).await.unwrap();
        assert_eq!(blocked, set(&["a"]));
        assert_eq!(fx.host.enforcer.last_applied(), Some(set(&["a"])));
    }

    #[tokio::test]
    async fn empty_blocked_set_is_applied() {
        let fx = Fixture::new(&[]);
        assert!(fx.host.enforcer.last_applied().is_none());

        fx.components.policy.apply(t0()).await.unwrap();
        assert_eq!(fx.host.enforcer.last_applied(), Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn apply_unblocking_leaves_store_alone() {
        let fx = Fixture::new(&["a", "b"]);
        let blocked = fx
            .components
            .policy
            .apply_unblocking(&token("a"), t0())
            .await
            .unwrap();
        assert_eq!(blocked, set(&["b"]));

        // A fresh recomputation blocks it again, nothing was persisted
        let blocked = fx.components.policy.apply(t0()).await.unwrap();
        assert_eq!(blocked, set(&["a", "b"]));
    }
}
