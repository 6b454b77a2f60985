//! Validated configuration used by the rest of mindful

use crate::schema::{
    RawApprovalConfig, RawConfig, RawDaemonConfig, RawGrantsConfig, RawHostConfig,
    RawShieldConfig, RawStoreConfig,
};
use mindful_util::default_data_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Display names of apps that are never offered the "Always Allow" shortcut
pub const DEFAULT_QUICK_EXEMPT_DENYLIST: &[&str] = &[
    // Social
    "Instagram",
    "TikTok",
    "Facebook",
    "Twitter",
    "X",
    "Snapchat",
    "Threads",
    "Reddit",
    "Bluesky",
    // Video and streaming
    "YouTube",
    "Netflix",
    "Twitch",
    "Disney+",
    "Hulu",
    "HBO Max",
    "Max",
    "Prime Video",
    "Apple TV",
    // Dating
    "Tinder",
    "Bumble",
    "Hinge",
    // News
    "News",
    "Google News",
    "Flipboard",
    // Games
    "Candy Crush Saga",
    "Clash of Clans",
    "Clash Royale",
    "Roblox",
    "Fortnite",
    "PUBG MOBILE",
    // Shopping
    "Amazon",
    "SHEIN",
    "Temu",
    "AliExpress",
];

const DEFAULT_TITLE: &str = "Mindful Pause";
const DEFAULT_SUBTITLE: &str = "Take a moment to reflect on whether you need {name} right now.";
const DEFAULT_PRIMARY_LABEL: &str = "Request Access";
const DEFAULT_SECONDARY_LABEL: &str = "Not Now";
const DEFAULT_QUICK_EXEMPT_LABEL: &str = "Always Allow";
const DEFAULT_MONITOR_PROGRAM: &str = "mindful-monitor";
const POLICY_FILENAME: &str = "blocked.json";

/// Validated configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub store: StoreConfig,
    pub grants: GrantsConfig,
    pub shield: ShieldConfig,
    pub approval: ApprovalConfig,
    pub host: HostConfig,
    pub daemon: DaemonConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let store = StoreConfig::from_raw(raw.store);
        let host = HostConfig::from_raw(raw.host, &store.data_dir);

        Self {
            grants: GrantsConfig::from_raw(raw.grants),
            shield: ShieldConfig::from_raw(raw.shield),
            approval: ApprovalConfig::from_raw(raw.approval),
            daemon: DaemonConfig::from_raw(raw.daemon),
            store,
            host,
        }
    }

    /// Point the store at another data directory.
    ///
    /// The policy file follows the data directory unless it was set explicitly.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        if self.host.policy_file == self.store.data_dir.join(POLICY_FILENAME) {
            self.host.policy_file = data_dir.join(POLICY_FILENAME);
        }
        self.store.data_dir = data_dir;
        self
    }
}

/// Durable store settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub write_timeout: Duration,
    pub claim_retention: Duration,
    pub log_limit: usize,
}

impl StoreConfig {
    fn from_raw(raw: RawStoreConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            write_timeout: raw
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
            claim_retention: raw
                .claim_retention_hours
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.claim_retention),
            log_limit: raw.log_limit.unwrap_or(defaults.log_limit),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            write_timeout: Duration::from_millis(2000),
            claim_retention: Duration::from_secs(24 * 3600),
            log_limit: 500,
        }
    }
}

/// Grant lifecycle settings
#[derive(Debug, Clone)]
pub struct GrantsConfig {
    pub warning_lead: Duration,
    pub min_timer_delay: Duration,
    pub pending_request_max_age: Duration,
    pub max_duration_minutes: u32,
    pub history_limit: usize,
}

impl GrantsConfig {
    fn from_raw(raw: RawGrantsConfig) -> Self {
        let defaults = Self::default();
        Self {
            warning_lead: raw
                .warning_lead_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.warning_lead),
            min_timer_delay: raw
                .min_timer_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.min_timer_delay),
            pending_request_max_age: raw
                .pending_request_max_age_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.pending_request_max_age),
            max_duration_minutes: raw
                .max_duration_minutes
                .unwrap_or(defaults.max_duration_minutes),
            history_limit: raw.history_limit.unwrap_or(defaults.history_limit),
        }
    }
}

impl Default for GrantsConfig {
    fn default() -> Self {
        Self {
            warning_lead: Duration::from_secs(300),
            min_timer_delay: Duration::from_secs(1),
            pending_request_max_age: Duration::from_secs(120),
            max_duration_minutes: 240,
            history_limit: 20,
        }
    }
}

/// Block screen settings
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    pub response_deadline: Duration,
    pub quick_exempt_denylist: Vec<String>,
    pub title: String,
    pub subtitle_template: String,
    pub primary_label: String,
    pub secondary_label: String,
    pub quick_exempt_label: String,
}

impl ShieldConfig {
    fn from_raw(raw: RawShieldConfig) -> Self {
        let defaults = Self::default();
        Self {
            response_deadline: raw
                .response_deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_deadline),
            quick_exempt_denylist: raw
                .quick_exempt_denylist
                .unwrap_or(defaults.quick_exempt_denylist),
            title: raw.title.unwrap_or(defaults.title),
            subtitle_template: raw.subtitle_template.unwrap_or(defaults.subtitle_template),
            primary_label: raw.primary_label.unwrap_or(defaults.primary_label),
            secondary_label: raw.secondary_label.unwrap_or(defaults.secondary_label),
            quick_exempt_label: raw.quick_exempt_label.unwrap_or(defaults.quick_exempt_label),
        }
    }

    /// Subtitle with the item's display name filled in
    pub fn subtitle(&self, display_name: &str) -> String {
        self.subtitle_template.replace("{name}", display_name)
    }

    /// Whether the "Always Allow" shortcut may be offered for this item.
    ///
    /// Matching is case-insensitive on the display name.
    pub fn allows_quick_exempt(&self, display_name: &str) -> bool {
        !self
            .quick_exempt_denylist
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(display_name.trim()))
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            response_deadline: Duration::from_millis(2000),
            quick_exempt_denylist: DEFAULT_QUICK_EXEMPT_DENYLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            title: DEFAULT_TITLE.into(),
            subtitle_template: DEFAULT_SUBTITLE.into(),
            primary_label: DEFAULT_PRIMARY_LABEL.into(),
            secondary_label: DEFAULT_SECONDARY_LABEL.into(),
            quick_exempt_label: DEFAULT_QUICK_EXEMPT_LABEL.into(),
        }
    }
}

/// External approval service settings
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// None means requests are never approved automatically
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl ApprovalConfig {
    fn from_raw(raw: RawApprovalConfig) -> Self {
        Self {
            endpoint: raw.endpoint,
            timeout: raw
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self::from_raw(RawApprovalConfig::default())
    }
}

/// Host integration settings
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub policy_file: PathBuf,
    pub monitor_program: String,
    pub notifications: bool,
}

impl HostConfig {
    fn from_raw(raw: RawHostConfig, data_dir: &std::path::Path) -> Self {
        Self {
            policy_file: raw
                .policy_file
                .unwrap_or_else(|| data_dir.join(POLICY_FILENAME)),
            monitor_program: raw
                .monitor_program
                .unwrap_or_else(|| DEFAULT_MONITOR_PROGRAM.into()),
            notifications: raw.notifications.unwrap_or(true),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_raw(RawHostConfig::default(), &default_data_dir())
    }
}

/// Main process settings
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub resume_interval: Duration,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            resume_interval: raw
                .resume_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}
