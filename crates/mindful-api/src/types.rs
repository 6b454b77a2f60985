//! Persisted record types

use chrono::{DateTime, Local};
use mindful_util::{CorrelationName, GrantId, ItemToken, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// The full set submitted to the enforcement mechanism
pub type BlockedSet = BTreeSet<ItemToken>;

/// Display name used when the name cache has nothing for a token
pub const UNKNOWN_ITEM_NAME: &str = "this app";

/// One temporary unblock.
///
/// A grant whose `expires_at` has passed is dead even if its record is still
/// in the store; only `is_active` decides whether it exempts its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub token: ItemToken,
    /// Name cached at creation, for notifications
    pub display_name: String,
    pub created_at: DateTime<Local>,
    pub expires_at: DateTime<Local>,
    pub duration_minutes: u32,
    pub justification: String,
    /// Key of the OS-scheduled trigger, also the grant's store key
    pub correlation: CorrelationName,
}

impl Grant {
    pub fn new(
        token: ItemToken,
        display_name: impl Into<String>,
        duration_minutes: u32,
        justification: impl Into<String>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            id: GrantId::new(),
            token,
            display_name: display_name.into(),
            created_at: now,
            expires_at: now + chrono::Duration::minutes(i64::from(duration_minutes)),
            duration_minutes,
            justification: justification.into(),
            correlation: CorrelationName::for_grant(),
        }
    }

    /// Whether this grant still exempts its token at `now`
    pub fn is_active(&self, now: DateTime<Local>) -> bool {
        self.expires_at > now
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        mindful_util::duration_until(self.expires_at, now)
    }
}

/// "User asked to unblock X, decision not yet made."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub token: ItemToken,
    pub display_name: String,
    pub created_at: DateTime<Local>,
    /// Filled in once the user explains why they need the item
    #[serde(default)]
    pub justification: Option<String>,
}

impl PendingRequest {
    pub fn new(token: ItemToken, display_name: impl Into<String>, now: DateTime<Local>) -> Self {
        Self {
            id: RequestId::new(),
            token,
            display_name: display_name.into(),
            created_at: now,
            justification: None,
        }
    }

    /// Requests older than `max_age` are stale and treated as absent.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Local>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age <= mindful_util::to_chrono(max_age)
    }
}

/// One past approval decision, fed back to the approval service as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantHistoryEntry {
    pub display_name: String,
    pub justification: String,
    pub decided_at: DateTime<Local>,
    pub approved: bool,
    pub minutes: Option<u32>,
}
