//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub store: RawStoreConfig,

    #[serde(default)]
    pub grants: RawGrantsConfig,

    #[serde(default)]
    pub shield: RawShieldConfig,

    #[serde(default)]
    pub approval: RawApprovalConfig,

    #[serde(default)]
    pub host: RawHostConfig,

    #[serde(default)]
    pub daemon: RawDaemonConfig,
}

/// Durable store settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStoreConfig {
    /// Shared data directory (default: ~/.local/share/mindful)
    pub data_dir: Option<PathBuf>,

    /// Upper bound on a single store write, in milliseconds
    pub write_timeout_ms: Option<u64>,

    /// How long claim markers are kept after a grant is reconciled
    pub claim_retention_hours: Option<u64>,

    /// Maximum number of diagnostic log lines kept
    pub log_limit: Option<usize>,
}

/// Grant lifecycle settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGrantsConfig {
    /// Lead time of the pre-expiry warning
    pub warning_lead_seconds: Option<u64>,

    /// Shortest delay an in-process timer is armed with
    pub min_timer_delay_seconds: Option<u64>,

    /// Pending requests older than this are ignored
    pub pending_request_max_age_seconds: Option<u64>,

    /// Longest grant the approval service may hand out
    pub max_duration_minutes: Option<u32>,

    /// Number of past decisions sent along with approval requests
    pub history_limit: Option<usize>,
}

/// Block screen settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawShieldConfig {
    /// Host deadline for answering a button press
    pub response_deadline_ms: Option<u64>,

    /// Display names that never get the "Always Allow" button
    pub quick_exempt_denylist: Option<Vec<String>>,

    pub title: Option<String>,

    /// Subtitle; `{name}` is replaced with the item's display name
    pub subtitle_template: Option<String>,

    pub primary_label: Option<String>,

    /// Secondary button when it only dismisses the shield
    pub secondary_label: Option<String>,

    /// Secondary button when it exempts the item permanently
    pub quick_exempt_label: Option<String>,
}

/// External approval service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawApprovalConfig {
    /// Endpoint accepting approval requests as JSON
    pub endpoint: Option<String>,

    pub timeout_seconds: Option<u64>,
}

/// Host integration settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostConfig {
    /// File the enforcer writes the blocked set to
    pub policy_file: Option<PathBuf>,

    /// Program the OS scheduler runs when a grant interval ends
    pub monitor_program: Option<String>,

    /// Whether desktop notifications are sent
    pub notifications: Option<bool>,
}

/// Main process settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// How often the main process runs the resume reconciler on its own
    pub resume_interval_seconds: Option<u64>,
}
