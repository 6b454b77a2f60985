//! In-memory channel for tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{Channel, ChannelError, ChannelResult};

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, Vec<u8>>,
    log: VecDeque<String>,
}

/// Channel backed by a map in process memory.
///
/// Can be switched off with [`MemoryChannel::set_available`] to simulate a
/// channel that rejects every operation, or slowed down with
/// [`MemoryChannel::set_write_delay`] to simulate a write stuck on a lock.
/// Clones share their records and switches.
#[derive(Clone)]
pub struct MemoryChannel {
    name: &'static str,
    state: Arc<Mutex<MemoryState>>,
    available: Arc<AtomicBool>,
    write_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryChannel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(MemoryState::default())),
            available: Arc::new(AtomicBool::new(true)),
            write_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Block the calling thread for `delay` on every write
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    fn stall(&self) {
        let delay = *self.write_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    fn state(&self) -> ChannelResult<MutexGuard<'_, MemoryState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(format!("{} is switched off", self.name)));
        }
        self.state
            .lock()
            .map_err(|_| ChannelError::Unavailable("memory channel lock poisoned".into()))
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl Channel for MemoryChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn read(&self, key: &str) -> ChannelResult<Option<Vec<u8>>> {
        Ok(self.state()?.records.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> ChannelResult<()> {
        self.stall();
        self.state()?.records.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> ChannelResult<()> {
        self.state()?.records.remove(key);
        Ok(())
    }

    fn create_exclusive(&self, key: &str, value: &[u8]) -> ChannelResult<bool> {
        let mut state = self.state()?;
        if state.records.contains_key(key) {
            return Ok(false);
        }
        state.records.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn list(&self, prefix: &str) -> ChannelResult<Vec<String>> {
        Ok(self
            .state()?
            .records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn append_line(&self, line: &str, limit: usize) -> ChannelResult<()> {
        let mut state = self.state()?;
        state.log.push_back(line.to_string());
        while state.log.len() > limit {
            state.log.pop_front();
        }
        Ok(())
    }

    fn read_lines(&self, limit: usize) -> ChannelResult<Vec<String>> {
        Ok(self.state()?.log.iter().rev().take(limit).cloned().collect())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
