//! Pending unlock requests in the main process

use mindful_api::{ApprovalRequest, GrantHistoryEntry, PendingRequest};
use mindful_config::GrantsConfig;
use mindful_host_api::ApprovalService;
use mindful_store::{LogEntry, LogEvent, Store};
use mindful_util::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{CoreResult, GrantError, GrantManager, GrantOutcome, ProcessRole};

/// Result of one [`RequestProcessor::process_pending`] call
#[derive(Debug)]
pub enum RequestOutcome {
    /// No fresh request in the slot
    NoRequest,
    /// A request exists but nobody has said why yet
    AwaitingJustification,
    Approved(GrantOutcome),
    Denied,
    /// Approved, but the grant could not be created
    GrantFailed(GrantError),
}

/// Turns the pending request left by the shield into a decision and, if
/// approved, a grant.
pub struct RequestProcessor {
    store: Arc<dyn Store>,
    grants: Arc<GrantManager>,
    approval: Arc<dyn ApprovalService>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    max_minutes: u32,
    history_limit: usize,
}

impl RequestProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        grants: Arc<GrantManager>,
        approval: Arc<dyn ApprovalService>,
        clock: Arc<dyn Clock>,
        config: &GrantsConfig,
    ) -> Self {
        Self {
            store,
            grants,
            approval,
            clock,
            max_age: config.pending_request_max_age,
            max_minutes: config.max_duration_minutes,
            history_limit: config.history_limit,
        }
    }

    /// The pending request, if it is still fresh
    pub fn pending(&self) -> CoreResult<Option<PendingRequest>> {
        Ok(self.store.pending_request(self.max_age, self.clock.now())?)
    }

    /// Attach a justification to the fresh pending request.
    ///
    /// Returns the updated request, or None if there is nothing to justify.
    pub fn submit_justification(&self, reason: &str) -> CoreResult<Option<PendingRequest>> {
        let Some(mut request) = self.pending()? else {
            return Ok(None);
        };
        request.justification = Some(reason.trim().to_string());
        self.store.save_pending_request(&request)?;
        debug!(item = %request.display_name, "Justification recorded");
        Ok(Some(request))
    }

    /// Decide on the pending request if it is ready.
    ///
    /// The slot is cleared before asking the approval service so a request is
    /// decided at most once. If the service cannot be reached the request is
    /// put back, unless a newer one arrived meanwhile, and the error returned.
    pub async fn process_pending(&self) -> CoreResult<RequestOutcome> {
        let Some(request) = self.pending()? else {
            return Ok(RequestOutcome::NoRequest);
        };
        let Some(justification) = request.justification.clone() else {
            return Ok(RequestOutcome::AwaitingJustification);
        };

        self.store.clear_pending_request()?;

        let approval_request = ApprovalRequest {
            token: request.token.clone(),
            display_name: request.display_name.clone(),
            justification: justification.clone(),
            recent_history: self.store.history(self.history_limit).unwrap_or_default(),
        };

        let decision = match self.approval.decide(&approval_request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(item = %request.display_name, error = %e, "Approval service failed");
                match self.store.restore_pending_request(&request) {
                    Ok(true) => {}
                    Ok(false) => debug!(item = %request.display_name, "Request superseded"),
                    Err(e) => warn!(error = %e, "Pending request lost"),
                }
                return Err(e.into());
            }
        };

        let minutes = decision.granted_minutes().map(|m| m.min(self.max_minutes));
        self.record_decision(&request, &justification, minutes);

        let Some(minutes) = minutes else {
            info!(item = %request.display_name, "Request denied");
            return Ok(RequestOutcome::Denied);
        };

        info!(item = %request.display_name, minutes, "Request approved");
        match self
            .grants
            .grant(
                request.token.as_str(),
                &request.display_name,
                minutes,
                &justification,
            )
            .await
        {
            Ok(outcome) => Ok(RequestOutcome::Approved(outcome)),
            Err(e) => {
                warn!(item = %request.display_name, error = %e, "Approved grant not created");
                Ok(RequestOutcome::GrantFailed(e))
            }
        }
    }

    fn record_decision(&self, request: &PendingRequest, justification: &str, minutes: Option<u32>) {
        let entry = GrantHistoryEntry {
            display_name: request.display_name.clone(),
            justification: justification.to_string(),
            decided_at: self.clock.now(),
            approved: minutes.is_some(),
            minutes,
        };
        if let Err(e) = self.store.append_history(entry, self.history_limit) {
            warn!(error = %e, "History not recorded");
        }

        let _ = self.store.append_log(LogEntry::new(
            ProcessRole::Main.as_str(),
            LogEvent::RequestDecided {
                display_name: request.display_name.clone(),
                approved: minutes.is_some(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, minutes_after, t0, token};
    use mindful_api::ApprovalDecision;
    use mindful_host_api::{HostError, HostResult};
    use std::sync::atomic::Ordering;

    fn request(fx: &Fixture, name: &str) {
        fx.store
            .save_pending_request(&PendingRequest::new(token("a"), name, fx.clock.now()))
            .unwrap();
    }

    #[tokio::test]
    async fn no_request_means_nothing_to_do() {
        let fx = Fixture::new(&["a"]);
        let outcome = fx.components.requests.process_pending().await.unwrap();
        assert!(matches!(outcome, RequestOutcome::NoRequest));
        assert!(fx.approval.requests().is_empty());
    }

    #[tokio::test]
    async fn request_waits_for_justification() {
        let fx = Fixture::new(&["a"]);
        request(&fx, "Maps");

        let outcome = fx.components.requests.process_pending().await.unwrap();
        assert!(matches!(outcome, RequestOutcome::AwaitingJustification));
        assert!(fx.components.requests.pending().unwrap().is_some());
    }

    #[tokio::test]
    async fn approved_request_becomes_grant() {
        let fx = Fixture::new(&["a", "b"]);
        request(&fx, "Maps");
        let requests = &fx.components.requests;
        requests.submit_justification("  need directions ").unwrap().unwrap();

        let outcome = requests.process_pending().await.unwrap();
        let RequestOutcome::Approved(outcome) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        assert_eq!(outcome.grant.expires_at, minutes_after(15));
        assert_eq!(outcome.grant.justification, "need directions");

        let asked = fx.approval.requests();
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0].justification, "need directions");
        assert!(asked[0].recent_history.is_empty());

        assert!(requests.pending().unwrap().is_none());
        let history = fx.store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].approved);
        assert_eq!(history[0].minutes, Some(15));
    }

    #[tokio::test]
    async fn approval_is_capped_at_max_duration() {
        let fx = Fixture::new(&["a"]);
        fx.approval.set_decision(ApprovalDecision::approved(10_000));
        request(&fx, "Maps");
        fx.components.requests.submit_justification("why").unwrap();

        let RequestOutcome::Approved(outcome) =
            fx.components.requests.process_pending().await.unwrap()
        else {
            panic!("expected approval");
        };
        assert_eq!(outcome.grant.duration_minutes, 240);
    }

    #[tokio::test]
    async fn denied_request_is_dropped_and_recorded() {
        let fx = Fixture::new(&["a"]);
        fx.approval.set_decision(ApprovalDecision::denied());
        request(&fx, "Maps");
        fx.components.requests.submit_justification("bored").unwrap();

        let outcome = fx.components.requests.process_pending().await.unwrap();
        assert!(matches!(outcome, RequestOutcome::Denied));
        assert!(fx.store.list_grants().unwrap().is_empty());
        assert!(fx.components.requests.pending().unwrap().is_none());

        let history = fx.store.history(10).unwrap();
        assert!(!history[0].approved);
        assert_eq!(history[0].minutes, None);
    }

    #[tokio::test]
    async fn history_accompanies_later_requests() {
        let fx = Fixture::new(&["a"]);
        fx.approval.set_decision(ApprovalDecision::denied());
        let requests = &fx.components.requests;

        request(&fx, "Maps");
        requests.submit_justification("first").unwrap();
        requests.process_pending().await.unwrap();

        request(&fx, "Maps");
        requests.submit_justification("second").unwrap();
        requests.process_pending().await.unwrap();

        let asked = fx.approval.requests();
        assert_eq!(asked[1].recent_history.len(), 1);
        assert_eq!(asked[1].recent_history[0].justification, "first");
    }

    #[tokio::test]
    async fn approval_failure_keeps_request() {
        let fx = Fixture::new(&["a"]);
        fx.approval.fail.store(true, Ordering::SeqCst);
        request(&fx, "Maps");
        fx.components.requests.submit_justification("why").unwrap();

        assert!(fx.components.requests.process_pending().await.is_err());
        let pending = fx.components.requests.pending().unwrap().unwrap();
        assert_eq!(pending.justification.as_deref(), Some("why"));
        assert!(fx.store.history(10).unwrap().is_empty());
    }

    /// Approval service that fails after the shield replaced the request
    struct SupersededWhileDeciding {
        store: Arc<dyn Store>,
        newer: PendingRequest,
    }

    #[async_trait::async_trait]
    impl ApprovalService for SupersededWhileDeciding {
        async fn decide(&self, _request: &ApprovalRequest) -> HostResult<ApprovalDecision> {
            self.store.save_pending_request(&self.newer).unwrap();
            Err(HostError::ApprovalFailed("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn failed_decision_keeps_newer_request() {
        let fx = Fixture::new(&["a", "b"]);
        request(&fx, "Old");
        fx.components.requests.submit_justification("why").unwrap();

        let newer = PendingRequest::new(token("b"), "Newer", fx.clock.now());
        let requests = RequestProcessor::new(
            fx.store.clone(),
            fx.components.grants.clone(),
            Arc::new(SupersededWhileDeciding {
                store: fx.store.clone(),
                newer: newer.clone(),
            }),
            fx.clock.clone(),
            &fx.config.grants,
        );

        assert!(requests.process_pending().await.is_err());
        let pending = requests.pending().unwrap().unwrap();
        assert_eq!(pending.id, newer.id);
        assert_eq!(pending.display_name, "Newer");
    }

    #[tokio::test]
    async fn stale_request_is_ignored() {
        let fx = Fixture::new(&["a"]);
        request(&fx, "Maps");
        fx.clock.set(t0() + chrono::Duration::seconds(121));

        assert!(fx.components.requests.submit_justification("late").unwrap().is_none());
        let outcome = fx.components.requests.process_pending().await.unwrap();
        assert!(matches!(outcome, RequestOutcome::NoRequest));
    }
}
