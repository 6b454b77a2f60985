//! Linux host effects for mindful
//!
//! Provides:
//! - Enforcement by writing the blocked set to a policy file that a
//!   platform agent (or a desktop shell extension) consumes
//! - Out-of-process expiry triggers via systemd user transient timers
//! - Desktop notifications via `notify-send`, delayed ones via systemd
//! - An HTTP client for the external approval service

mod approval;
mod enforcer;
mod host;
mod notifier;
mod scheduler;

pub use approval::*;
pub use enforcer::*;
pub use host::*;
pub use notifier::*;
pub use scheduler::*;

/// Whole seconds until `at`, at least one, for `systemd-run --on-active`
pub(crate) fn on_active_seconds(
    at: chrono::DateTime<chrono::Local>,
    now: chrono::DateTime<chrono::Local>,
) -> u64 {
    let remaining = mindful_util::duration_until(at, now);
    // Round up so the timer never fires before `at`
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_active_rounds_up_and_clamps() {
        let now = mindful_util::now();
        assert_eq!(on_active_seconds(now, now), 1);
        assert_eq!(on_active_seconds(now - chrono::Duration::seconds(30), now), 1);
        assert_eq!(
            on_active_seconds(now + chrono::Duration::milliseconds(90_500), now),
            91
        );
    }
}
