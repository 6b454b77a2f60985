//! Default paths for mindful components
//!
//! All three processes must agree on these, since the data directory is the
//! only thing they share.
//! - Config: `$XDG_CONFIG_HOME/mindful/config.toml` or `~/.config/mindful/config.toml`
//! - Data: `$XDG_DATA_HOME/mindful` or `~/.local/share/mindful`
//! - Logs: `$XDG_STATE_HOME/mindful` or `~/.local/state/mindful`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const MINDFUL_CONFIG_ENV: &str = "MINDFUL_CONFIG";

/// Environment variable for overriding the data directory
pub const MINDFUL_DATA_DIR_ENV: &str = "MINDFUL_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "mindful";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$MINDFUL_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/mindful/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/mindful/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(MINDFUL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// 1. `$XDG_DATA_HOME/mindful` (if XDG_DATA_HOME is set)
/// 2. `~/.local/share/mindful` (fallback)
///
/// `$MINDFUL_DATA_DIR` is not consulted here; the binaries read it as an
/// override on top of the configured directory.
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
