//! Block screen button handling

use mindful_api::{
    Notification, PendingRequest, ShieldAction, ShieldConfiguration, ShieldResponse,
    UNKNOWN_ITEM_NAME,
};
use mindful_config::ShieldConfig;
use mindful_host_api::HostEffects;
use mindful_store::{LogEntry, LogEvent, Store};
use mindful_util::{Clock, ItemToken};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{CoreResult, PolicyEngine, ProcessRole, with_store};

/// Run `fut`, but resolve to `fallback` if it does not finish within `deadline`.
///
/// The host gives button handlers a hard deadline and must always get an
/// answer; work still pending at the deadline is dropped.
pub async fn complete_within<F, T>(deadline: Duration, fut: F, fallback: T) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(value) => value,
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "Handler missed its deadline");
            fallback
        }
    }
}

/// Answers the block screen in the shield process
pub struct ShieldHandler {
    store: Arc<dyn Store>,
    policy: Arc<PolicyEngine>,
    host: HostEffects,
    clock: Arc<dyn Clock>,
    config: ShieldConfig,
}

impl ShieldHandler {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<PolicyEngine>,
        host: HostEffects,
        clock: Arc<dyn Clock>,
        config: ShieldConfig,
    ) -> Self {
        Self {
            store,
            policy,
            host,
            clock,
            config,
        }
    }

    fn display_name(&self, token: &ItemToken) -> String {
        cached_name(self.store.as_ref(), token)
    }

    /// What the block screen for `token` shows
    pub fn configuration(&self, token: &ItemToken) -> ShieldConfiguration {
        let name = self.display_name(token);
        let quick_exempt = self.config.allows_quick_exempt(&name);
        ShieldConfiguration {
            title: self.config.title.clone(),
            subtitle: self.config.subtitle(&name),
            primary_label: self.config.primary_label.clone(),
            secondary_label: if quick_exempt {
                self.config.quick_exempt_label.clone()
            } else {
                self.config.secondary_label.clone()
            },
            quick_exempt,
        }
    }

    /// Handle a button press. Always answers within the response deadline.
    pub async fn handle_action(&self, action: ShieldAction, token: &ItemToken) -> ShieldResponse {
        let deadline = self.config.response_deadline;
        match action {
            ShieldAction::Primary => {
                complete_within(deadline, self.request_access(token), ShieldResponse::Defer).await
            }
            ShieldAction::Secondary => {
                complete_within(deadline, self.secondary(token), ShieldResponse::Close).await
            }
        }
    }

    async fn request_access(&self, token: &ItemToken) -> ShieldResponse {
        if let Err(e) = self.submit_request(token).await {
            warn!(token = %token, error = %e, "Unlock request not recorded");
        }
        ShieldResponse::Defer
    }

    async fn submit_request(&self, token: &ItemToken) -> CoreResult<()> {
        let now = self.clock.now();
        let token = token.clone();
        let name = with_store(&self.store, move |store| {
            let name = cached_name(store, &token);
            store.save_pending_request(&PendingRequest::new(token, name.clone(), now))?;
            Ok(name)
        })
        .await?;

        if let Err(e) = self
            .host
            .notifier
            .notify(&Notification::unlock_request(&name))
            .await
        {
            debug!(error = %e, "Unlock notification not delivered");
        }

        self.log(LogEvent::RequestSubmitted {
            display_name: name.clone(),
        })
        .await;
        info!(item = %name, "Unlock requested");
        Ok(())
    }

    async fn secondary(&self, token: &ItemToken) -> ShieldResponse {
        if let Err(e) = self.exempt(token).await {
            warn!(token = %token, error = %e, "Exemption not applied");
        }
        ShieldResponse::Close
    }

    async fn exempt(&self, token: &ItemToken) -> CoreResult<()> {
        let config = self.config.clone();
        let token = token.clone();
        let exempted = with_store(&self.store, move |store| {
            let name = cached_name(store, &token);
            if !config.allows_quick_exempt(&name) {
                return Ok(None);
            }
            let mut exemptions = store.exemptions()?;
            exemptions.insert(token);
            store.save_exemptions(&exemptions)?;
            Ok(Some(name))
        })
        .await?;

        let Some(name) = exempted else {
            debug!("Quick exemption not offered");
            return Ok(());
        };

        self.policy.apply(self.clock.now()).await?;

        self.log(LogEvent::ExemptionAdded {
            display_name: name.clone(),
        })
        .await;
        info!(item = %name, "Item permanently exempted");
        Ok(())
    }

    async fn log(&self, event: LogEvent) {
        let entry = LogEntry::new(ProcessRole::Shield.as_str(), event);
        let _ = with_store(&self.store, move |store| Ok(store.append_log(entry)?)).await;
    }
}

fn cached_name(store: &dyn Store, token: &ItemToken) -> String {
    match store.item_name(token) {
        Ok(Some(name)) => name,
        Ok(None) => UNKNOWN_ITEM_NAME.to_string(),
        Err(e) => {
            debug!(error = %e, "Name cache unavailable");
            UNKNOWN_ITEM_NAME.to_string()
        }
    }
}
