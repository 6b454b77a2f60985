//! Desktop notifications

use async_trait::async_trait;
use chrono::{DateTime, Local};
use mindful_api::Notification;
use mindful_host_api::{HostError, HostResult, Notifier};
use tokio::process::Command;
use tracing::debug;

use crate::on_active_seconds;

const APP_NAME: &str = "mindful";

/// Sends notifications through `notify-send`.
///
/// Delayed notifications are handed to a transient systemd timer so they
/// survive the process that scheduled them.
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn notify_send_args(notification: &Notification) -> Vec<String> {
        vec![
            format!("--app-name={}", APP_NAME),
            format!("--category={}", notification.kind.as_str()),
            notification.title.clone(),
            notification.body.clone(),
        ]
    }
}

async fn run(program: &str, args: &[String]) -> HostResult<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| HostError::NotificationFailed(format!("{}: {}", program, e)))?;

    if !status.success() {
        return Err(HostError::NotificationFailed(format!(
            "{} exited with {}",
            program, status
        )));
    }
    Ok(())
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, notification: &Notification) -> HostResult<()> {
        if !self.enabled {
            debug!(kind = notification.kind.as_str(), "Notifications disabled");
            return Ok(());
        }
        run("notify-send", &Self::notify_send_args(notification)).await
    }

    async fn schedule(&self, notification: &Notification, at: DateTime<Local>) -> HostResult<()> {
        if !self.enabled {
            debug!(kind = notification.kind.as_str(), "Notifications disabled");
            return Ok(());
        }

        let now = mindful_util::now();
        if at <= now {
            return self.notify(notification).await;
        }

        let mut args = vec![
            "--user".to_string(),
            "--collect".to_string(),
            format!("--on-active={}s", on_active_seconds(at, now)),
            "notify-send".to_string(),
        ];
        args.extend(Self::notify_send_args(notification));

        debug!(kind = notification.kind.as_str(), at = %at, "Scheduling notification");
        run("systemd-run", &args).await
    }
}
