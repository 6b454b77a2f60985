//! Core events emitted by background tasks

use mindful_util::CorrelationName;

use crate::ReconcileOutcome;

/// Events emitted by in-process timers
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A reblock timer fired and reconciliation finished
    TimerFired {
        correlation: CorrelationName,
        outcome: ReconcileOutcome,
    },

    /// A reblock timer fired but reconciliation failed; the resume
    /// reconciler will retry
    TimerFailed {
        correlation: CorrelationName,
        error: String,
    },
}

impl CoreEvent {
    pub fn correlation(&self) -> &CorrelationName {
        match self {
            CoreEvent::TimerFired { correlation, .. }
            | CoreEvent::TimerFailed { correlation, .. } => correlation,
        }
    }
}
