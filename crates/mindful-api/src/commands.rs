//! Requests crossing the boundary to external collaborators: the approval
//! service and the host's shield.

use mindful_util::ItemToken;
use serde::{Deserialize, Serialize};

use crate::GrantHistoryEntry;

/// What the approval service is asked to decide on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub token: ItemToken,
    pub display_name: String,
    pub justification: String,
    /// Most recent decisions, oldest first
    pub recent_history: Vec<GrantHistoryEntry>,
}

/// The approval service's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approve: bool,
    #[serde(default)]
    pub minutes: Option<u32>,
}

impl ApprovalDecision {
    pub fn approved(minutes: u32) -> Self {
        Self {
            approve: true,
            minutes: Some(minutes),
        }
    }

    pub fn denied() -> Self {
        Self {
            approve: false,
            minutes: None,
        }
    }

    /// Minutes to grant, if this is an approval with a usable duration
    pub fn granted_minutes(&self) -> Option<u32> {
        match (self.approve, self.minutes) {
            (true, Some(m)) if m > 0 => Some(m),
            _ => None,
        }
    }
}

/// Button pressed on the block screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldAction {
    /// "Request Access"
    Primary,
    /// "Always Allow" (or "Not Now" for items that can't be quick-exempted)
    Secondary,
}

/// How the host should proceed after a button press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldResponse {
    /// Dismiss the shield
    Close,
    /// Keep the shield up; the decision happens elsewhere
    Defer,
}

/// Display parameters for the block screen. Rendering is up to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldConfiguration {
    pub title: String,
    pub subtitle: String,
    pub primary_label: String,
    pub secondary_label: String,
    /// Whether the secondary button grants a permanent exemption
    pub quick_exempt: bool,
}
