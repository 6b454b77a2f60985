//! All Linux host effects for one process

use mindful_host_api::HostEffects;
use mindful_util::MINDFUL_DATA_DIR_ENV;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{DesktopNotifier, FileEnforcer, SystemdScheduler};

/// Linux implementations of the enforcement, scheduling and notification
/// effects
pub struct LinuxHost {
    pub enforcer: Arc<FileEnforcer>,
    pub scheduler: Arc<SystemdScheduler>,
    pub notifier: Arc<DesktopNotifier>,
}

impl LinuxHost {
    /// `data_dir` is passed on to monitor processes started by systemd, so
    /// they open the same store as the process that armed them.
    pub fn new(
        policy_file: impl Into<PathBuf>,
        monitor_program: &str,
        data_dir: &Path,
        notifications: bool,
    ) -> Self {
        let scheduler = SystemdScheduler::new(monitor_program)
            .with_env(MINDFUL_DATA_DIR_ENV, data_dir.display().to_string());
        Self {
            enforcer: Arc::new(FileEnforcer::new(policy_file)),
            scheduler: Arc::new(scheduler),
            notifier: Arc::new(DesktopNotifier::new(notifications)),
        }
    }

    pub fn effects(&self) -> HostEffects {
        HostEffects {
            enforcer: self.enforcer.clone(),
            scheduler: self.scheduler.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindful_host_api::MonitorWindow;
    use mindful_util::CorrelationName;

    #[test]
    fn monitor_processes_inherit_data_dir() {
        let host = LinuxHost::new(
            "/tmp/blocked.json",
            "mindful-monitor",
            Path::new("/srv/mindful"),
            false,
        );
        let now = mindful_util::now();
        let name = CorrelationName::for_grant();
        let window = MonitorWindow {
            start: now,
            end: now + chrono::Duration::minutes(10),
        };

        let args = host.scheduler.start_args(&name, &window, now);
        assert!(args.contains(&format!("--setenv={}=/srv/mindful", MINDFUL_DATA_DIR_ENV)));
        assert_eq!(host.enforcer.path(), Path::new("/tmp/blocked.json"));
    }
}
