//! Grant lifecycle manager

use mindful_api::{Grant, Notification};
use mindful_host_api::{HostEffects, MonitorWindow};
use mindful_store::{LogEntry, LogEvent, Store};
use mindful_util::{Clock, ItemToken, to_chrono};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{GrantError, GrantResult, PolicyEngine, ProcessRole, ReblockTimers, Reconciler};

/// What happened while creating a grant.
///
/// Only decoding, duration and duplicate checks can stop a grant; everything
/// after the unblock is best effort and reported here.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub grant: Grant,
    pub unblocked: bool,
    pub persisted: bool,
    pub monitor_armed: bool,
    pub warning_scheduled: bool,
}

/// Creates grants and arms both expiry triggers for them
pub struct GrantManager {
    store: Arc<dyn Store>,
    policy: Arc<PolicyEngine>,
    reconciler: Arc<Reconciler>,
    timers: ReblockTimers,
    host: HostEffects,
    clock: Arc<dyn Clock>,
    warning_lead: Duration,
    role: ProcessRole,
}

impl GrantManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<PolicyEngine>,
        reconciler: Arc<Reconciler>,
        timers: ReblockTimers,
        host: HostEffects,
        clock: Arc<dyn Clock>,
        warning_lead: Duration,
        role: ProcessRole,
    ) -> Self {
        Self {
            store,
            policy,
            reconciler,
            timers,
            host,
            clock,
            warning_lead,
            role,
        }
    }

    /// Unblock `encoded_token` for `duration_minutes`.
    ///
    /// Fails without writing anything if the token does not decode, the
    /// duration is zero, or the item already has an active grant. An expired
    /// but unreconciled grant for the same item is reconciled first.
    pub async fn grant(
        &self,
        encoded_token: &str,
        display_name: &str,
        duration_minutes: u32,
        justification: &str,
    ) -> GrantResult<GrantOutcome> {
        let token = ItemToken::decode(encoded_token)?;
        if duration_minutes == 0 {
            return Err(GrantError::InvalidDuration(duration_minutes));
        }
        self.ensure_not_granted(&token, display_name).await?;

        let now = self.clock.now();
        let grant = Grant::new(token, display_name, duration_minutes, justification, now);

        let (unblocked, persisted) = {
            let guard = self.policy.begin().await;

            let unblocked = match guard.apply_unblocking(&grant.token, now).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(item = %display_name, error = %e, "Unblock failed");
                    false
                }
            };

            let persisted = match self.store.put_grant(&grant) {
                Ok(()) => true,
                Err(e) => {
                    // The next full recomputation reblocks the item
                    warn!(item = %display_name, error = %e, "Grant not persisted");
                    false
                }
            };
            (unblocked, persisted)
        };

        if let Err(e) = self.store.save_item_name(&grant.token, display_name) {
            warn!(error = %e, "Name cache not updated");
        }

        self.timers.arm(&grant.correlation, grant.expires_at);

        let window = MonitorWindow {
            start: now,
            end: grant.expires_at,
        };
        let monitor_armed = match self
            .host
            .scheduler
            .start_monitoring(&grant.correlation, window)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(correlation = %grant.correlation, error = %e, "OS trigger not armed");
                let _ = self.store.append_log(LogEntry::new(
                    self.role.as_str(),
                    LogEvent::SchedulingFailed {
                        correlation: grant.correlation.clone(),
                        error: e.to_string(),
                    },
                ));
                false
            }
        };

        let warning_scheduled = self.schedule_warning(&grant, now).await;

        let _ = self.store.append_log(LogEntry::new(
            self.role.as_str(),
            LogEvent::GrantCreated {
                correlation: grant.correlation.clone(),
                display_name: grant.display_name.clone(),
                expires_at: grant.expires_at,
            },
        ));

        info!(
            correlation = %grant.correlation,
            item = %grant.display_name,
            minutes = duration_minutes,
            expires_at = %grant.expires_at,
            "Grant created"
        );

        Ok(GrantOutcome {
            grant,
            unblocked,
            persisted,
            monitor_armed,
            warning_scheduled,
        })
    }

    async fn ensure_not_granted(&self, token: &ItemToken, display_name: &str) -> GrantResult<()> {
        let now = self.clock.now();
        for existing in self.store.list_grants()? {
            if &existing.token != token {
                continue;
            }
            if existing.is_active(now) {
                let _ = self.store.append_log(LogEntry::new(
                    self.role.as_str(),
                    LogEvent::GrantRejected {
                        display_name: display_name.to_string(),
                        reason: "already unblocked".into(),
                    },
                ));
                return Err(GrantError::AlreadyGranted {
                    expires_at: existing.expires_at,
                });
            }

            if let Err(e) = self.reconciler.reconcile_expiry(&existing.correlation).await {
                warn!(correlation = %existing.correlation, error = %e, "Could not reconcile dead grant");
            }
            self.timers.cancel(&existing.correlation);
        }
        Ok(())
    }

    async fn schedule_warning(&self, grant: &Grant, now: chrono::DateTime<chrono::Local>) -> bool {
        let at = grant.expires_at - to_chrono(self.warning_lead);
        if at <= now {
            return false;
        }

        let lead_minutes = self.warning_lead.as_secs().div_ceil(60);
        let notification = Notification::expiry_warning(&grant.display_name, lead_minutes);
        match self.host.notifier.schedule(&notification, at).await {
            Ok(()) => true,
            Err(e) => {
                warn!(correlation = %grant.correlation, error = %e, "Warning not scheduled");
                false
            }
        }
    }
}
