//! OS-scheduled expiry triggers via systemd user timers

use async_trait::async_trait;
use mindful_host_api::{ActivityScheduler, HostError, HostResult, MonitorWindow};
use mindful_util::CorrelationName;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::on_active_seconds;

/// Arms a transient `systemd --user` timer per grant.
///
/// When the timer elapses systemd runs `<monitor_program> interval-ended
/// <correlation>` as a fresh process, regardless of whether the main process
/// is still alive. The transient unit is named after the correlation name so
/// it can be stopped again.
pub struct SystemdScheduler {
    monitor_program: String,
    env: Vec<(String, String)>,
}

impl SystemdScheduler {
    pub fn new(monitor_program: impl Into<String>) -> Self {
        Self {
            monitor_program: monitor_program.into(),
            env: Vec::new(),
        }
    }

    /// Pass an environment variable through to the monitor process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Arguments for `systemd-run` that arm the trigger for `window`
    pub fn start_args(
        &self,
        correlation: &CorrelationName,
        window: &MonitorWindow,
        now: chrono::DateTime<chrono::Local>,
    ) -> Vec<String> {
        let mut args = vec![
            "--user".to_string(),
            "--collect".to_string(),
            format!("--unit={}", correlation),
            format!("--on-active={}s", on_active_seconds(window.end, now)),
            "--timer-property=AccuracySec=1s".to_string(),
        ];
        for (key, value) in &self.env {
            args.push(format!("--setenv={}={}", key, value));
        }
        args.push(self.monitor_program.clone());
        args.push("interval-ended".to_string());
        args.push(correlation.to_string());
        args
    }
}

#[async_trait]
impl ActivityScheduler for SystemdScheduler {
    async fn start_monitoring(
        &self,
        correlation: &CorrelationName,
        window: MonitorWindow,
    ) -> HostResult<()> {
        let args = self.start_args(correlation, &window, mindful_util::now());
        debug!(correlation = %correlation, args = ?args, "Arming systemd timer");

        let output = Command::new("systemd-run")
            .args(&args)
            .output()
            .await
            .map_err(|e| HostError::SchedulingFailed(format!("systemd-run: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostError::SchedulingFailed(format!(
                "systemd-run exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(correlation = %correlation, end = %window.end, "Monitoring started");
        Ok(())
    }

    async fn stop_monitoring(&self, correlation: &CorrelationName) -> HostResult<()> {
        let output = Command::new("systemctl")
            .args(["--user", "stop", &format!("{}.timer", correlation)])
            .output()
            .await
            .map_err(|e| HostError::SchedulingFailed(format!("systemctl: {}", e)))?;

        if output.status.success() {
            debug!(correlation = %correlation, "Monitoring stopped");
        } else {
            // Usually the timer already fired and was collected
            warn!(
                correlation = %correlation,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "systemctl stop did not succeed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_args_name_unit_and_delay() {
        let scheduler = SystemdScheduler::new("/usr/bin/mindful-monitor")
            .with_env("MINDFUL_DATA_DIR", "/tmp/mindful");
        let name = CorrelationName::parse("reblock-1234").unwrap();
        let now = mindful_util::now();
        let window = MonitorWindow {
            start: now,
            end: now + chrono::Duration::minutes(10),
        };

        let args = scheduler.start_args(&name, &window, now);
        assert!(args.contains(&"--unit=reblock-1234".to_string()));
        assert!(args.contains(&"--on-active=600s".to_string()));
        assert!(args.contains(&"--setenv=MINDFUL_DATA_DIR=/tmp/mindful".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            &[
                "/usr/bin/mindful-monitor".to_string(),
                "interval-ended".to_string(),
                "reblock-1234".to_string()
            ]
        );
    }
}
