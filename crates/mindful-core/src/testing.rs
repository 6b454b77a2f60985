//! Shared fixtures for unit tests

use chrono::{DateTime, Duration, Local, TimeZone};
use mindful_api::ApprovalDecision;
use mindful_config::Config;
use mindful_host_api::{MockApprovalService, MockHost};
use mindful_store::{DualStore, MemoryChannel, Store};
use mindful_util::{ItemToken, ManualClock};
use std::sync::Arc;

use crate::{Components, ProcessRole};

pub fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn minutes_after(minutes: i64) -> DateTime<Local> {
    t0() + Duration::minutes(minutes)
}

pub fn token(name: &str) -> ItemToken {
    ItemToken::from_bytes(name.as_bytes()).unwrap()
}

/// One simulated process over an in-memory store
pub struct Fixture {
    pub store: Arc<DualStore>,
    /// The store's only channel
    pub channel: MemoryChannel,
    pub host: MockHost,
    pub approval: Arc<MockApprovalService>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
    pub components: Components,
}

impl Fixture {
    /// A main process managing the items named in `universe`
    pub fn new(universe: &[&str]) -> Self {
        let channel = MemoryChannel::new("memory");
        let store = Arc::new(DualStore::new(vec![Box::new(channel.clone())], 100));
        store
            .save_universe(&universe.iter().map(|n| token(n)).collect())
            .unwrap();

        Self::build(
            ProcessRole::Main,
            channel,
            store,
            MockHost::new(),
            Arc::new(ManualClock::new(t0())),
            Config::default(),
        )
    }

    /// Another process of `role` sharing this fixture's store, clock,
    /// enforcement mechanism and scheduler
    pub fn sibling(&self, role: ProcessRole) -> Self {
        Self::build(
            role,
            self.channel.clone(),
            self.store.clone(),
            self.host.sibling(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    /// Rebuild with a different configuration
    pub fn with_config(self, config: Config) -> Self {
        Self::build(
            self.components.role,
            self.channel,
            self.store,
            self.host,
            self.clock,
            config,
        )
    }

    fn build(
        role: ProcessRole,
        channel: MemoryChannel,
        store: Arc<DualStore>,
        host: MockHost,
        clock: Arc<ManualClock>,
        config: Config,
    ) -> Self {
        let approval = Arc::new(MockApprovalService::new(ApprovalDecision::approved(15)));
        let components = Components::new(
            role,
            store.clone(),
            host.effects(),
            approval.clone(),
            clock.clone(),
            &config,
        );
        Self {
            store,
            channel,
            host,
            approval,
            clock,
            config,
            components,
        }
    }
}
