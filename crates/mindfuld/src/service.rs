//! The long-running main process

use anyhow::{Context, Result};
use mindful_config::Config;
use mindful_core::{Components, CoreEvent, ReconcileOutcome, RequestOutcome, RequestProcessor};
use mindful_store::{LogEntry, LogEvent};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the pending-request slot is polled
const REQUEST_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Service {
    components: Components,
    resume_interval: Duration,
}

impl Service {
    pub fn new(components: Components, config: &Config) -> Self {
        Self {
            components,
            resume_interval: config.daemon.resume_interval,
        }
    }

    pub async fn run(self) -> Result<()> {
        let components = &self.components;
        let mut timer_events = components.timers.subscribe();

        let _ = components.store.append_log(LogEntry::new(
            components.role.as_str(),
            LogEvent::ProcessStarted,
        ));

        // Anything that expired while we were not running
        self.resume("startup").await;

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        // Sent by the system sleep hook after resume
        let mut sigusr1 =
            signal(SignalKind::user_defined1()).context("Failed to create SIGUSR1 handler")?;

        let mut resume_timer = tokio::time::interval(self.resume_interval);
        resume_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        resume_timer.tick().await;

        let mut request_timer = tokio::time::interval(REQUEST_POLL_INTERVAL);
        request_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The approval call can take as long as its timeout; it runs on its
        // own task so signals and reconciliation are never queued behind it.
        let mut deciding: Option<JoinHandle<()>> = None;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sigusr1.recv() => {
                    self.resume("resume").await;
                }

                _ = resume_timer.tick() => {
                    self.resume("periodic").await;
                }

                _ = request_timer.tick() => {
                    self.poll_requests(&mut deciding);
                }

                Some(event) = timer_events.recv() => {
                    Self::handle_core_event(event);
                }
            }
        }

        components.timers.cancel_all();
        if let Some(task) = deciding.filter(|task| !task.is_finished()) {
            debug!("Abandoning request decision in progress");
            task.abort();
        }
        info!("Shutdown complete");
        Ok(())
    }

    async fn resume(&self, reason: &str) {
        match self.components.resume.reconcile_all().await {
            Ok(summary) => debug!(reason, ?summary, "Reconciliation pass"),
            Err(e) => warn!(reason, error = %e, "Reconciliation pass failed"),
        }
    }

    /// Start deciding the pending request unless a decision is still running
    fn poll_requests(&self, deciding: &mut Option<JoinHandle<()>>) {
        if deciding.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let requests = self.components.requests.clone();
        *deciding = Some(tokio::spawn(async move {
            Self::process_requests(&requests).await;
        }));
    }

    async fn process_requests(requests: &RequestProcessor) {
        match requests.process_pending().await {
            Ok(RequestOutcome::Approved(outcome)) => {
                info!(
                    item = %outcome.grant.display_name,
                    expires_at = %outcome.grant.expires_at,
                    "Unlock request approved"
                );
            }
            Ok(RequestOutcome::Denied) => info!("Unlock request denied"),
            Ok(RequestOutcome::GrantFailed(e)) => {
                warn!(error = %e, "Approved request could not be granted");
            }
            Ok(RequestOutcome::NoRequest | RequestOutcome::AwaitingJustification) => {}
            Err(e) => warn!(error = %e, "Request processing failed"),
        }
    }

    fn handle_core_event(event: CoreEvent) {
        match event {
            CoreEvent::TimerFired {
                correlation,
                outcome,
            } => match outcome {
                ReconcileOutcome::Reconciled(grant) => {
                    info!(correlation = %correlation, item = %grant.display_name, "Reblocked");
                }
                other => debug!(correlation = %correlation, outcome = ?other, "Timer fired"),
            },
            CoreEvent::TimerFailed { correlation, error } => {
                warn!(correlation = %correlation, error = %error, "Timer failed; the next pass retries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindful_api::{ApprovalDecision, PendingRequest};
    use mindful_core::ProcessRole;
    use mindful_host_api::{MockApprovalService, MockHost};
    use mindful_store::{DualStore, MemoryChannel, Store};
    use mindful_util::{Clock, ItemToken, ManualClock};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn slow_approval_does_not_hold_up_reconciliation() {
        let token = ItemToken::from_bytes(b"a").unwrap();
        let store = Arc::new(DualStore::new(vec![Box::new(MemoryChannel::new("memory"))], 100));
        store.save_universe(&[token.clone()].into()).unwrap();

        let clock = Arc::new(ManualClock::new(mindful_util::now()));
        let mut request = PendingRequest::new(token, "Maps", clock.now());
        request.justification = Some("directions".into());
        store.save_pending_request(&request).unwrap();

        let host = MockHost::new();
        let approval = Arc::new(MockApprovalService::new(ApprovalDecision::approved(10)));
        approval.set_delay(Some(Duration::from_secs(30)));
        let config = Config::default();
        let components = Components::new(
            ProcessRole::Main,
            store.clone(),
            host.effects(),
            approval.clone(),
            clock,
            &config,
        );
        let service = Service::new(components, &config);

        let mut deciding = None;
        service.poll_requests(&mut deciding);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(approval.requests().len(), 1);

        // Still deciding: no second decision, and a resume pass goes through
        service.poll_requests(&mut deciding);
        service.resume("test").await;
        assert!(host.enforcer.last_applied().is_some());
        assert!(store.list_grants().unwrap().is_empty());

        deciding.unwrap().await.unwrap();
        assert_eq!(approval.requests().len(), 1);
        assert_eq!(store.list_grants().unwrap().len(), 1);
    }
}
