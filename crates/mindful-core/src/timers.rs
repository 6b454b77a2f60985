//! In-process reblock timers

use chrono::{DateTime, Local};
use mindful_util::{Clock, CorrelationName, duration_until};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{CoreEvent, Reconciler};

struct ArmedTimer {
    generation: u64,
    expires_at: DateTime<Local>,
    handle: JoinHandle<()>,
}

/// One tokio task per grant that reconciles it at expiry.
///
/// Timers are keyed by correlation name; arming an already armed name
/// cancels the old task. Timers die with the process, which is why the OS
/// trigger and the resume reconciler exist.
#[derive(Clone)]
pub struct ReblockTimers {
    reconciler: Arc<Reconciler>,
    clock: Arc<dyn Clock>,
    min_delay: Duration,
    timers: Arc<Mutex<HashMap<CorrelationName, ArmedTimer>>>,
    next_generation: Arc<AtomicU64>,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<CoreEvent>>>>,
}

impl ReblockTimers {
    pub fn new(reconciler: Arc<Reconciler>, clock: Arc<dyn Clock>, min_delay: Duration) -> Self {
        Self {
            reconciler,
            clock,
            min_delay,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            events: Arc::new(Mutex::new(None)),
        }
    }

    /// Receive an event for every timer that fires from now on.
    ///
    /// Shared by all clones; a new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<CorrelationName, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delay for a timer armed now: time left, but never less than the minimum
    pub fn delay_until(&self, expires_at: DateTime<Local>) -> Duration {
        duration_until(expires_at, self.clock.now()).max(self.min_delay)
    }

    /// Arm (or re-arm) the timer for a grant. Must be called inside a tokio runtime.
    pub fn arm(&self, correlation: &CorrelationName, expires_at: DateTime<Local>) {
        let delay = self.delay_until(expires_at);
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let reconciler = self.reconciler.clone();
        let timers = self.timers.clone();
        let events = self.events.clone();
        let name = correlation.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Once due, reconciliation runs on its own task: cancelling the
            // timer must not stop it between the claim and the reapply.
            let reconciling = {
                let name = name.clone();
                tokio::spawn(async move { reconciler.reconcile_expiry(&name).await })
            };
            let event = match reconciling.await {
                Ok(Ok(outcome)) => CoreEvent::TimerFired {
                    correlation: name.clone(),
                    outcome,
                },
                Ok(Err(e)) => {
                    warn!(correlation = %name, error = %e, "Timer reconciliation failed");
                    CoreEvent::TimerFailed {
                        correlation: name.clone(),
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(correlation = %name, error = %e, "Timer reconciliation aborted");
                    CoreEvent::TimerFailed {
                        correlation: name.clone(),
                        error: e.to_string(),
                    }
                }
            };

            {
                let mut timers = timers.lock().unwrap_or_else(|e| e.into_inner());
                if timers.get(&name).is_some_and(|t| t.generation == generation) {
                    timers.remove(&name);
                }
            }

            let tx = events.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(tx) = tx {
                let _ = tx.send(event);
            }
        });

        let previous = self.timers().insert(
            correlation.clone(),
            ArmedTimer {
                generation,
                expires_at,
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
            debug!(correlation = %correlation, "Replaced armed timer");
        }

        debug!(
            correlation = %correlation,
            delay_secs = delay.as_secs(),
            "Reblock timer armed"
        );
    }

    /// Whether a timer for this grant is pending in this process
    pub fn is_armed(&self, correlation: &CorrelationName) -> bool {
        self.timers()
            .get(correlation)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Cancel the timer for a grant, if any.
    ///
    /// A timer that is already reconciling finishes that reconciliation.
    pub fn cancel(&self, correlation: &CorrelationName) -> bool {
        match self.timers().remove(correlation) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Pending timers and the expiry each is armed for
    pub fn armed(&self) -> Vec<(CorrelationName, DateTime<Local>)> {
        let mut armed: Vec<_> = self
            .timers()
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(name, t)| (name.clone(), t.expires_at))
            .collect();
        armed.sort_by_key(|(_, expires_at)| *expires_at);
        armed
    }

    /// Cancel everything (shutdown)
    pub fn cancel_all(&self) {
        for (_, timer) in self.timers().drain() {
            timer.handle.abort();
        }
    }
}
