//! Store over an ordered list of channels

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    Channel, ChannelError, ChannelReport, FileChannel, LogEntry, SqliteChannel, Store, StoreDiagnostics,
    StoreError, StoreKey, StoreResult,
};

const FILE_CHANNEL_DIR: &str = "state";
const SQLITE_FILENAME: &str = "mindful.db";

/// Store writing through every channel and reading from the first that answers.
///
/// The channel order is the read precedence: a record found in an earlier
/// channel shadows the same key in later ones.
pub struct DualStore {
    channels: Vec<Box<dyn Channel>>,
    log_limit: usize,
}

impl DualStore {
    pub fn new(channels: Vec<Box<dyn Channel>>, log_limit: usize) -> Self {
        Self {
            channels,
            log_limit,
        }
    }

    /// Open the standard layout under `data_dir`: files first, then SQLite.
    ///
    /// A channel that cannot be opened is left out; the store only fails if
    /// neither can be opened.
    pub fn open(
        data_dir: impl AsRef<Path>,
        write_timeout: Duration,
        log_limit: usize,
    ) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        let mut channels: Vec<Box<dyn Channel>> = Vec::new();

        match FileChannel::open(data_dir.join(FILE_CHANNEL_DIR)) {
            Ok(channel) => channels.push(Box::new(channel)),
            Err(e) => warn!(error = %e, "File channel unavailable"),
        }

        let sqlite = std::fs::create_dir_all(data_dir)
            .map_err(ChannelError::from)
            .and_then(|_| SqliteChannel::open(data_dir.join(SQLITE_FILENAME), write_timeout));
        match sqlite {
            Ok(channel) => channels.push(Box::new(channel)),
            Err(e) => warn!(error = %e, "SQLite channel unavailable"),
        }

        if channels.is_empty() {
            return Err(StoreError::AllChannelsFailed {
                operation: "open",
                key: data_dir.display().to_string(),
            });
        }

        debug!(
            data_dir = %data_dir.display(),
            channels = channels.len(),
            "Store opened"
        );
        Ok(Self::new(channels, log_limit))
    }

    /// Run `op` on every channel; succeed if at least one channel did.
    fn on_all(
        &self,
        operation: &'static str,
        key: &str,
        op: impl Fn(&dyn Channel) -> crate::ChannelResult<()>,
    ) -> StoreResult<()> {
        let mut accepted = 0;
        for channel in &self.channels {
            match op(channel.as_ref()) {
                Ok(()) => accepted += 1,
                Err(e) => warn!(
                    channel = channel.name(),
                    operation,
                    key,
                    error = %e,
                    "Channel rejected operation"
                ),
            }
        }

        if accepted == 0 {
            return Err(StoreError::AllChannelsFailed {
                operation,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl Store for DualStore {
    fn put(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let key = key.as_key();
        self.on_all("write", &key, |c| c.write(&key, value))
    }

    fn get(&self, key: &StoreKey) -> StoreResult<Option<Vec<u8>>> {
        let key = key.as_key();
        let mut answered = false;

        for channel in &self.channels {
            match channel.read(&key) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => answered = true,
                Err(e) => {
                    debug!(channel = channel.name(), key = %key, error = %e, "Channel read failed")
                }
            }
        }

        if !answered {
            return Err(StoreError::AllChannelsFailed {
                operation: "read",
                key,
            });
        }
        Ok(None)
    }

    fn remove(&self, key: &StoreKey) -> StoreResult<()> {
        let key = key.as_key();
        self.on_all("delete", &key, |c| c.delete(&key))
    }

    fn put_exclusive(&self, key: &StoreKey, value: &[u8]) -> StoreResult<bool> {
        let key = key.as_key();

        // Arbitration needs a single authority: the first channel that answers
        for channel in &self.channels {
            if !channel.is_available() {
                continue;
            }
            match channel.create_exclusive(&key, value) {
                Ok(created) => return Ok(created),
                Err(e) => {
                    warn!(channel = channel.name(), key = %key, error = %e, "Exclusive create failed")
                }
            }
        }

        Err(StoreError::AllChannelsFailed {
            operation: "exclusive create",
            key,
        })
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut answered = false;

        for channel in &self.channels {
            match channel.list(prefix) {
                Ok(found) => {
                    answered = true;
                    keys.extend(found);
                }
                Err(e) => {
                    debug!(channel = channel.name(), prefix, error = %e, "Channel list failed")
                }
            }
        }

        if !answered {
            return Err(StoreError::AllChannelsFailed {
                operation: "list",
                key: prefix.to_string(),
            });
        }
        Ok(keys.into_iter().collect())
    }

    fn append_log(&self, entry: LogEntry) -> StoreResult<()> {
        let line = serde_json::to_string(&entry)?;
        self.on_all("append", "log", |c| c.append_line(&line, self.log_limit))
    }

    fn recent_log(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        for channel in &self.channels {
            match channel.read_lines(limit) {
                Ok(lines) if !lines.is_empty() => {
                    return Ok(lines
                        .iter()
                        .filter_map(|line| serde_json::from_str(line).ok())
                        .collect());
                }
                Ok(_) => {}
                Err(e) => debug!(channel = channel.name(), error = %e, "Channel log read failed"),
            }
        }
        Ok(Vec::new())
    }

    fn diagnostics(&self) -> StoreResult<StoreDiagnostics> {
        let mut channels = Vec::new();
        for channel in &self.channels {
            let available = channel.is_available();
            let mut keys = Vec::new();
            if available {
                for key in StoreKey::singletons() {
                    let key = key.as_key();
                    if matches!(channel.read(&key), Ok(Some(_))) {
                        keys.push(key);
                    }
                }
                for prefix in [crate::GRANT_PREFIX, crate::CLAIM_PREFIX] {
                    keys.extend(channel.list(prefix).unwrap_or_default());
                }
            }
            channels.push(ChannelReport {
                name: channel.name().to_string(),
                available,
                keys,
            });
        }
        Ok(StoreDiagnostics { channels })
    }

    fn is_healthy(&self) -> bool {
        self.channels.iter().any(|c| c.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClaimOutcome, LogEvent, MemoryChannel};
    use chrono::{DateTime, Local, TimeZone};
    use mindful_api::{Grant, GrantHistoryEntry, PendingRequest};
    use mindful_util::ItemToken;

    fn two_channels() -> (DualStore, MemoryChannel, MemoryChannel) {
        let first = MemoryChannel::new("first");
        let second = MemoryChannel::new("second");
        let store = DualStore::new(
            vec![Box::new(first.clone()), Box::new(second.clone())],
            50,
        );
        (store, first, second)
    }

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn token(name: &str) -> ItemToken {
        ItemToken::from_bytes(name.as_bytes()).unwrap()
    }

    #[test]
    fn writes_reach_both_channels() {
        let (store, first, second) = two_channels();
        store.put(&StoreKey::Universe, b"[]").unwrap();

        assert_eq!(first.read("universe").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(second.read("universe").unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn write_succeeds_if_one_channel_accepts() {
        let (store, first, second) = two_channels();
        first.set_available(false);

        store.put(&StoreKey::Universe, b"[1]").unwrap();
        assert_eq!(second.read("universe").unwrap(), Some(b"[1]".to_vec()));

        second.set_available(false);
        assert!(matches!(
            store.put(&StoreKey::Universe, b"[2]"),
            Err(StoreError::AllChannelsFailed { .. })
        ));
    }

    #[test]
    fn reads_prefer_first_channel() {
        let (store, first, second) = two_channels();
        first.write("universe", b"\"first\"").unwrap();
        second.write("universe", b"\"second\"").unwrap();

        assert_eq!(
            store.get(&StoreKey::Universe).unwrap(),
            Some(b"\"first\"".to_vec())
        );

        first.delete("universe").unwrap();
        assert_eq!(
            store.get(&StoreKey::Universe).unwrap(),
            Some(b"\"second\"".to_vec())
        );

        // An unreachable first channel falls through as well
        first.write("universe", b"\"first\"").unwrap();
        first.set_available(false);
        assert_eq!(
            store.get(&StoreKey::Universe).unwrap(),
            Some(b"\"second\"".to_vec())
        );
    }

    #[test]
    fn read_with_no_channels_answering_is_an_error() {
        let (store, first, second) = two_channels();
        first.set_available(false);
        second.set_available(false);
        assert!(store.get(&StoreKey::Universe).is_err());
    }

    #[test]
    fn grant_round_trip() {
        let (store, _, _) = two_channels();
        let grant = Grant::new(token("a"), "Maps", 10, "directions", t0());

        store.put_grant(&grant).unwrap();
        assert_eq!(store.get_grant(&grant.correlation).unwrap(), Some(grant.clone()));
        assert_eq!(store.list_grants().unwrap(), vec![grant]);
    }

    #[test]
    fn list_grants_merges_channels() {
        let (store, first, second) = two_channels();
        let a = Grant::new(token("a"), "A", 10, "", t0());
        let b = Grant::new(token("b"), "B", 20, "", t0());

        store.put_grant(&a).unwrap();
        // b only made it into the second channel
        first.set_available(false);
        store.put_grant(&b).unwrap();
        first.set_available(true);

        // Conflicting copy of a in the second channel is shadowed
        let mut stale = a.clone();
        stale.display_name = "stale".into();
        second
            .write(
                &StoreKey::Grant(a.correlation.clone()).as_key(),
                &serde_json::to_vec(&stale).unwrap(),
            )
            .unwrap();

        let grants = store.list_grants().unwrap();
        assert_eq!(grants, vec![a, b]);
    }

    #[test]
    fn claim_is_exclusive_and_removes_record() {
        let (store, first, second) = two_channels();
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        store.put_grant(&grant).unwrap();

        let later = t0() + chrono::Duration::minutes(11);
        assert_eq!(
            store.claim_grant(&grant.correlation, later).unwrap(),
            ClaimOutcome::Claimed(grant.clone())
        );
        assert_eq!(
            store.claim_grant(&grant.correlation, later).unwrap(),
            ClaimOutcome::AlreadyClaimed
        );

        let key = StoreKey::Grant(grant.correlation.clone()).as_key();
        assert!(first.read(&key).unwrap().is_none());
        assert!(second.read(&key).unwrap().is_none());
        assert!(store.get_grant(&grant.correlation).unwrap().is_none());
    }

    #[test]
    fn claimed_grants_are_hidden() {
        let (store, _, second) = two_channels();
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        store.put_grant(&grant).unwrap();

        // Removal reached only the first channel
        second.set_available(false);
        store
            .claim_grant(&grant.correlation, t0() + chrono::Duration::minutes(11))
            .unwrap();
        second.set_available(true);

        assert!(second
            .read(&StoreKey::Grant(grant.correlation.clone()).as_key())
            .unwrap()
            .is_some());
        assert!(store.list_grants().unwrap().is_empty());
        assert!(store.get_grant(&grant.correlation).unwrap().is_none());
    }

    #[test]
    fn claim_of_missing_grant_vanishes() {
        let (store, _, _) = two_channels();
        let name = mindful_util::CorrelationName::for_grant();
        assert_eq!(
            store.claim_grant(&name, t0()).unwrap(),
            ClaimOutcome::Vanished
        );
    }

    #[test]
    fn prune_claims_drops_old_markers() {
        let (store, _, _) = two_channels();
        let old = Grant::new(token("a"), "A", 10, "", t0());
        let recent = Grant::new(token("b"), "B", 10, "", t0());
        store.put_grant(&old).unwrap();
        store.put_grant(&recent).unwrap();

        store.claim_grant(&old.correlation, t0()).unwrap();
        store
            .claim_grant(&recent.correlation, t0() + chrono::Duration::hours(30))
            .unwrap();

        let pruned = store.prune_claims(t0() + chrono::Duration::hours(24)).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.keys("claim/").unwrap().len(), 1);
    }

    #[test]
    fn unreadable_claim_marker_is_pruned() {
        let (store, _, _) = two_channels();
        let grant = Grant::new(token("a"), "A", 10, "", t0());
        store.put_grant(&grant).unwrap();
        store
            .put(&StoreKey::Claim(grant.correlation.clone()), b"")
            .unwrap();
        assert!(store.get_grant(&grant.correlation).unwrap().is_none());

        assert_eq!(store.prune_claims(t0()).unwrap(), 1);
        assert!(store.keys("claim/").unwrap().is_empty());
        assert!(store.keys("grant/").unwrap().is_empty());
    }

    #[test]
    fn restore_does_not_overwrite_newer_request() {
        let (store, _, _) = two_channels();
        let old = PendingRequest::new(token("a"), "Old", t0());
        let newer = PendingRequest::new(token("b"), "Newer", t0());

        assert!(store.restore_pending_request(&old).unwrap());
        store.save_pending_request(&newer).unwrap();
        assert!(!store.restore_pending_request(&old).unwrap());

        let current = store.pending_request(Duration::from_secs(120), t0()).unwrap();
        assert_eq!(current.unwrap().id, newer.id);
    }

    #[test]
    fn stale_pending_request_reads_as_absent() {
        let (store, _, _) = two_channels();
        let request = PendingRequest::new(token("a"), "A", t0());
        store.save_pending_request(&request).unwrap();

        let max_age = Duration::from_secs(120);
        let fresh = store
            .pending_request(max_age, t0() + chrono::Duration::seconds(60))
            .unwrap();
        assert_eq!(fresh, Some(request));

        let stale = store
            .pending_request(max_age, t0() + chrono::Duration::seconds(121))
            .unwrap();
        assert!(stale.is_none());
        // The record itself is still there
        assert!(store.get(&StoreKey::PendingRequest).unwrap().is_some());

        store.clear_pending_request().unwrap();
        assert!(store.get(&StoreKey::PendingRequest).unwrap().is_none());
    }

    #[test]
    fn universe_and_name_cache() {
        let (store, _, _) = two_channels();
        assert!(store.universe().unwrap().is_empty());

        let universe: BTreeSet<_> = [token("a"), token("b")].into_iter().collect();
        store.save_universe(&universe).unwrap();
        assert_eq!(store.universe().unwrap(), universe);

        store.save_item_name(&token("a"), "Maps").unwrap();
        assert_eq!(store.item_name(&token("a")).unwrap().as_deref(), Some("Maps"));
        assert!(store.item_name(&token("b")).unwrap().is_none());
    }

    #[test]
    fn history_keeps_most_recent() {
        let (store, _, _) = two_channels();
        for i in 0..5u32 {
            store
                .append_history(
                    GrantHistoryEntry {
                        display_name: format!("app {}", i),
                        justification: "work".into(),
                        decided_at: t0(),
                        approved: true,
                        minutes: Some(i),
                    },
                    3,
                )
                .unwrap();
        }

        let history = store.history(10).unwrap();
        let names: Vec<_> = history.iter().map(|h| h.display_name.as_str()).collect();
        assert_eq!(names, vec!["app 2", "app 3", "app 4"]);
        assert_eq!(store.history(2).unwrap().len(), 2);
    }

    #[test]
    fn undecodable_record_reads_as_absent() {
        let (store, first, _) = two_channels();
        first.write("universe", b"not json").unwrap();
        assert!(store.universe().unwrap().is_empty());
    }

    #[test]
    fn log_is_advisory() {
        let (store, first, second) = two_channels();
        store
            .append_log(LogEntry::new("test", LogEvent::ProcessStarted))
            .unwrap();
        assert_eq!(store.recent_log(10).unwrap().len(), 1);

        first.set_available(false);
        second.set_available(false);
        assert!(store
            .append_log(LogEntry::new("test", LogEvent::ProcessStarted))
            .is_err());
        assert!(store.recent_log(10).unwrap().is_empty());
    }

    #[test]
    fn diagnostics_report_presence_per_channel() {
        let (store, first, _) = two_channels();
        first.set_available(false);
        store.put(&StoreKey::Universe, b"[]").unwrap();
        first.set_available(true);

        let report = store.diagnostics().unwrap();
        assert_eq!(report.channels.len(), 2);
        assert!(report.channels[0].keys.is_empty());
        assert_eq!(report.channels[1].keys, vec!["universe".to_string()]);
    }

    #[test]
    fn open_on_disk_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DualStore::open(dir.path(), Duration::from_secs(1), 100).unwrap();
        assert!(store.is_healthy());

        let grant = Grant::new(token("a"), "A", 10, "", t0());
        store.put_grant(&grant).unwrap();

        // A second handle (another process) sees the same data
        let other = DualStore::open(dir.path(), Duration::from_secs(1), 100).unwrap();
        assert_eq!(other.list_grants().unwrap(), vec![grant.clone()]);
        assert!(dir.path().join("mindful.db").exists());
        assert!(dir
            .path()
            .join("state/grant")
            .join(format!("{}.json", grant.correlation))
            .exists());
    }
}
