//! Storage channel abstraction

use crate::ChannelResult;

/// One independent place to keep key-value records.
///
/// Keys are `/`-separated ASCII paths such as `grant/reblock-<uuid>`. Values
/// are opaque bytes (JSON in practice).
pub trait Channel: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &'static str;

    /// Read a record, `None` if this channel does not have it
    fn read(&self, key: &str) -> ChannelResult<Option<Vec<u8>>>;

    /// Create or replace a record
    fn write(&self, key: &str, value: &[u8]) -> ChannelResult<()>;

    /// Remove a record; removing a missing record is not an error
    fn delete(&self, key: &str) -> ChannelResult<()>;

    /// Create a record only if it does not exist yet.
    ///
    /// Returns `true` if this call created it. Must be atomic with respect to
    /// other processes using the same channel.
    fn create_exclusive(&self, key: &str, value: &[u8]) -> ChannelResult<bool>;

    /// All keys starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> ChannelResult<Vec<String>>;

    /// Append one line to the diagnostic log, keeping at most `limit` lines
    fn append_line(&self, line: &str, limit: usize) -> ChannelResult<()>;

    /// Most recent log lines, newest first
    fn read_lines(&self, limit: usize) -> ChannelResult<Vec<String>>;

    /// Whether the channel can currently be used
    fn is_available(&self) -> bool;
}
