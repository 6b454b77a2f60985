//! Store trait definitions

use chrono::{DateTime, Local};
use mindful_api::{Grant, GrantHistoryEntry, PendingRequest};
use mindful_util::{CorrelationName, ItemToken};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{CLAIM_PREFIX, GRANT_PREFIX, LogEntry, StoreKey, StoreResult};

/// Result of trying to claim a grant for reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the reconciliation; the record has been removed
    Claimed(Grant),
    /// Someone else claimed it first
    AlreadyClaimed,
    /// The claim was taken but the record was already gone
    Vanished,
}

/// Per-channel view of what is stored, for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreDiagnostics {
    pub channels: Vec<ChannelReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelReport {
    pub name: String,
    pub available: bool,
    /// Keys present in this channel
    pub keys: Vec<String>,
}

/// Main store trait.
///
/// The required methods are raw key-value operations; everything else is
/// built on them, so all implementations share the same record layout.
pub trait Store: Send + Sync {
    // Raw records

    /// Write a record
    fn put(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()>;

    /// Read a record
    fn get(&self, key: &StoreKey) -> StoreResult<Option<Vec<u8>>>;

    /// Remove a record
    fn remove(&self, key: &StoreKey) -> StoreResult<()>;

    /// Create a record only if nobody else has; `true` if this call created it
    fn put_exclusive(&self, key: &StoreKey, value: &[u8]) -> StoreResult<bool>;

    /// All keys starting with `prefix`
    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    // Diagnostic log

    /// Append a diagnostic log entry
    fn append_log(&self, entry: LogEntry) -> StoreResult<()>;

    /// Get recent log entries, newest first
    fn recent_log(&self, limit: usize) -> StoreResult<Vec<LogEntry>>;

    // Health

    /// Per-channel presence report
    fn diagnostics(&self) -> StoreResult<StoreDiagnostics>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;

    // Grants

    /// Persist a grant
    fn put_grant(&self, grant: &Grant) -> StoreResult<()> {
        write_json(self, &StoreKey::Grant(grant.correlation.clone()), grant)
    }

    /// Look up a grant; claimed grants are reported absent
    fn get_grant(&self, correlation: &CorrelationName) -> StoreResult<Option<Grant>> {
        if self.get(&StoreKey::Claim(correlation.clone()))?.is_some() {
            return Ok(None);
        }
        read_json(self, &StoreKey::Grant(correlation.clone()))
    }

    /// All unclaimed grant records, live or dead, ordered by expiry
    fn list_grants(&self) -> StoreResult<Vec<Grant>> {
        let claimed: HashSet<String> = self
            .keys(CLAIM_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(CLAIM_PREFIX).map(str::to_string))
            .collect();

        let mut grants = Vec::new();
        for key in self.keys(GRANT_PREFIX)? {
            let Some(name) = key.strip_prefix(GRANT_PREFIX) else {
                continue;
            };
            if claimed.contains(name) {
                continue;
            }
            let correlation = match CorrelationName::parse(name) {
                Ok(c) => c,
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring grant with unusable key");
                    continue;
                }
            };
            if let Some(grant) = read_json::<Self, Grant>(self, &StoreKey::Grant(correlation))? {
                grants.push(grant);
            }
        }

        grants.sort_by_key(|g| g.expires_at);
        Ok(grants)
    }

    /// Take exclusive ownership of reconciling a grant.
    ///
    /// Only one caller across all processes gets [`ClaimOutcome::Claimed`]. The
    /// winner's record is removed before this returns.
    fn claim_grant(
        &self,
        correlation: &CorrelationName,
        now: DateTime<Local>,
    ) -> StoreResult<ClaimOutcome> {
        let marker = serde_json::to_vec(&now)?;
        if !self.put_exclusive(&StoreKey::Claim(correlation.clone()), &marker)? {
            debug!(correlation = %correlation, "Grant already claimed");
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let grant_key = StoreKey::Grant(correlation.clone());
        let Some(grant) = read_json::<Self, Grant>(self, &grant_key)? else {
            return Ok(ClaimOutcome::Vanished);
        };

        // The claim marker already hides the record; a leftover copy is
        // removed when the claim is pruned.
        if let Err(e) = self.remove(&grant_key) {
            warn!(correlation = %correlation, error = %e, "Claimed grant could not be removed");
        }
        Ok(ClaimOutcome::Claimed(grant))
    }

    /// Drop claim markers (and any leftover grant records) claimed before `older_than`
    fn prune_claims(&self, older_than: DateTime<Local>) -> StoreResult<usize> {
        let mut pruned = 0;
        for key in self.keys(CLAIM_PREFIX)? {
            let Some(name) = key.strip_prefix(CLAIM_PREFIX) else {
                continue;
            };
            let Ok(correlation) = CorrelationName::parse(name) else {
                continue;
            };
            let claim_key = StoreKey::Claim(correlation.clone());
            let Some(marker) = self.get(&claim_key)? else {
                continue;
            };
            // A marker that cannot be decoded dates from a crashed writer
            let claimed_at = serde_json::from_slice::<DateTime<Local>>(&marker).ok();
            if claimed_at.is_some_and(|at| at >= older_than) {
                continue;
            }

            self.remove(&StoreKey::Grant(correlation))?;
            self.remove(&claim_key)?;
            pruned += 1;
        }
        Ok(pruned)
    }

    // Pending request

    /// Replace the pending request (a newer request supersedes an older one)
    fn save_pending_request(&self, request: &PendingRequest) -> StoreResult<()> {
        write_json(self, &StoreKey::PendingRequest, request)
    }

    /// The pending request, if there is one younger than `max_age`
    fn pending_request(
        &self,
        max_age: Duration,
        now: DateTime<Local>,
    ) -> StoreResult<Option<PendingRequest>> {
        let request = read_json::<Self, PendingRequest>(self, &StoreKey::PendingRequest)?;
        Ok(request.filter(|r| r.is_fresh(max_age, now)))
    }

    /// Put a request back after a failed decision, unless a newer request
    /// has taken the slot in the meantime. Returns whether it was restored.
    fn restore_pending_request(&self, request: &PendingRequest) -> StoreResult<bool> {
        match read_json::<Self, PendingRequest>(self, &StoreKey::PendingRequest)? {
            Some(current) if current.id != request.id => Ok(false),
            _ => {
                self.save_pending_request(request)?;
                Ok(true)
            }
        }
    }

    fn clear_pending_request(&self) -> StoreResult<()> {
        self.remove(&StoreKey::PendingRequest)
    }

    // Universe selection

    /// Items under management
    fn universe(&self) -> StoreResult<BTreeSet<ItemToken>> {
        Ok(read_json(self, &StoreKey::Universe)?.unwrap_or_default())
    }

    fn save_universe(&self, universe: &BTreeSet<ItemToken>) -> StoreResult<()> {
        write_json(self, &StoreKey::Universe, universe)
    }

    /// Items that are never blocked
    fn exemptions(&self) -> StoreResult<BTreeSet<ItemToken>> {
        Ok(read_json(self, &StoreKey::Exemptions)?.unwrap_or_default())
    }

    fn save_exemptions(&self, exemptions: &BTreeSet<ItemToken>) -> StoreResult<()> {
        write_json(self, &StoreKey::Exemptions, exemptions)
    }

    // Name cache

    fn name_cache(&self) -> StoreResult<BTreeMap<ItemToken, String>> {
        Ok(read_json(self, &StoreKey::NameCache)?.unwrap_or_default())
    }

    /// Cached display name of an item
    fn item_name(&self, token: &ItemToken) -> StoreResult<Option<String>> {
        Ok(self.name_cache()?.remove(token))
    }

    fn save_item_name(&self, token: &ItemToken, name: &str) -> StoreResult<()> {
        let mut cache = self.name_cache()?;
        if cache.get(token).map(String::as_str) == Some(name) {
            return Ok(());
        }
        cache.insert(token.clone(), name.to_string());
        write_json(self, &StoreKey::NameCache, &cache)
    }

    // Approval history

    /// The most recent `limit` decisions, oldest first
    fn history(&self, limit: usize) -> StoreResult<Vec<GrantHistoryEntry>> {
        let mut entries: Vec<GrantHistoryEntry> =
            read_json(self, &StoreKey::History)?.unwrap_or_default();
        let excess = entries.len().saturating_sub(limit);
        entries.drain(..excess);
        Ok(entries)
    }

    /// Record a decision, keeping at most `limit` entries
    fn append_history(&self, entry: GrantHistoryEntry, limit: usize) -> StoreResult<()> {
        let mut entries = self.history(limit)?;
        entries.push(entry);
        let excess = entries.len().saturating_sub(limit);
        entries.drain(..excess);
        write_json(self, &StoreKey::History, &entries)
    }
}

fn write_json<S, T>(store: &S, key: &StoreKey, value: &T) -> StoreResult<()>
where
    S: Store + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    store.put(key, &bytes)
}

/// Read and decode a record. Undecodable records are treated as absent.
fn read_json<S, T>(store: &S, key: &StoreKey) -> StoreResult<Option<T>>
where
    S: Store + ?Sized,
    T: DeserializeOwned,
{
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key = %key, error = %e, "Ignoring undecodable record");
            Ok(None)
        }
    }
}
