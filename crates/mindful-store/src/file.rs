//! Structured file storage channel

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Channel, ChannelError, ChannelResult};

const RECORD_EXT: &str = ".json";
const LOG_FILENAME: &str = "log.jsonl";

/// One JSON file per record under a root directory.
///
/// Replacements go through a temporary file and a rename, so readers in other
/// processes see either the old or the new record, never a partial one.
pub struct FileChannel {
    root: PathBuf,
}

impl FileChannel {
    /// Use (and create if needed) the given directory
    pub fn open(root: impl AsRef<Path>) -> ChannelResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "File channel opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> ChannelResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .split('/')
                .all(|part| !part.is_empty() && !part.starts_with('.'));
        if !valid {
            return Err(ChannelError::Unavailable(format!("invalid key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}{}", key, RECORD_EXT)))
    }

    fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILENAME)
    }
}

fn ensure_parent(path: &Path) -> ChannelResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write `value` to a fresh hidden file next to `path` and return its path
fn write_tmp(path: &Path, value: &[u8]) -> ChannelResult<PathBuf> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(value)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

fn write_atomic(path: &Path, value: &[u8]) -> ChannelResult<()> {
    let tmp = write_tmp(path, value)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

impl Channel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, key: &str) -> ChannelResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> ChannelResult<()> {
        write_atomic(&self.path_for(key)?, value)
    }

    fn delete(&self, key: &str) -> ChannelResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn create_exclusive(&self, key: &str, value: &[u8]) -> ChannelResult<bool> {
        // Linking a complete file into place fails if the name exists, so the
        // record appears with its contents or not at all.
        let path = self.path_for(key)?;
        let tmp = write_tmp(&path, value)?;
        let linked = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> ChannelResult<Vec<String>> {
        let (dir_part, name_prefix) = match prefix.rfind('/') {
            Some(i) => prefix.split_at(i + 1),
            None => ("", prefix),
        };

        let entries = match fs::read_dir(self.root.join(dir_part)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(RECORD_EXT) else {
                continue;
            };
            if stem.starts_with('.') || !stem.starts_with(name_prefix) {
                continue;
            }
            keys.push(format!("{}{}", dir_part, stem));
        }
        keys.sort();
        Ok(keys)
    }

    fn append_line(&self, line: &str, limit: usize) -> ChannelResult<()> {
        let path = self.log_path();
        {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{}", line)?;
        }

        // Trim in batches so that appends stay cheap
        let content = fs::read_to_string(&path)?;
        let count = content.lines().count();
        if limit > 0 && count > limit * 2 {
            let kept: Vec<&str> = content.lines().skip(count - limit).collect();
            let mut trimmed = kept.join("\n");
            trimmed.push('\n');
            write_atomic(&path, trimmed.as_bytes())?;
        }
        Ok(())
    }

    fn read_lines(&self, limit: usize) -> ChannelResult<Vec<String>> {
        let content = match fs::read_to_string(self.log_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(limit)
            .map(str::to_string)
            .collect())
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path()).unwrap();

        assert!(channel.read("universe").unwrap().is_none());
        channel.write("universe", b"[1]").unwrap();
        assert_eq!(channel.read("universe").unwrap(), Some(b"[1]".to_vec()));

        channel.write("universe", b"[2]").unwrap();
        assert_eq!(channel.read("universe").unwrap(), Some(b"[2]".to_vec()));

        channel.delete("universe").unwrap();
        channel.delete("universe").unwrap();
        assert!(channel.read("universe").unwrap().is_none());
    }

    #[test]
    fn nested_keys_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path()).unwrap();

        channel.write("grant/reblock-b", b"{}").unwrap();
        channel.write("grant/reblock-a", b"{}").unwrap();
        channel.write("claim/reblock-a", b"{}").unwrap();

        assert_eq!(
            channel.list("grant/").unwrap(),
            vec!["grant/reblock-a".to_string(), "grant/reblock-b".to_string()]
        );
        assert!(channel.list("missing/").unwrap().is_empty());
        assert!(dir.path().join("grant/reblock-a.json").exists());
    }

    #[test]
    fn create_exclusive_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path()).unwrap();

        assert!(channel.create_exclusive("claim/reblock-x", b"1").unwrap());
        assert!(!channel.create_exclusive("claim/reblock-x", b"2").unwrap());
        assert_eq!(channel.read("claim/reblock-x").unwrap(), Some(b"1".to_vec()));

        // No temporary files are left behind either way
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("claim"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("reblock-x.json")]);
    }

    #[test]
    fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path()).unwrap();
        assert!(channel.write("../outside", b"x").is_err());
        assert!(channel.write("grant//x", b"x").is_err());
    }

    #[test]
    fn log_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path()).unwrap();

        for i in 0..25 {
            channel.append_line(&format!("line {}", i), 5).unwrap();
        }

        let lines = channel.read_lines(100).unwrap();
        assert!(lines.len() <= 10);
        assert_eq!(lines[0], "line 24");
    }
}
