//! Durable shared state for mindful
//!
//! Every process talks to the same data directory through a [`DualStore`],
//! which writes each record to an ordered list of [`Channel`]s:
//! - a directory of JSON files
//! - a SQLite key-value table
//!
//! Writes succeed if any channel accepts them. Reads take the first channel
//! that has the key. Provides:
//! - Grants, with exclusive claim markers for reconciliation
//! - The pending-request slot
//! - Universe, exemptions, name cache and approval history
//! - An advisory diagnostic log

mod channel;
mod dual;
mod file;
mod keys;
mod log;
mod memory;
mod sqlite;
mod traits;

pub use channel::*;
pub use dual::*;
pub use file::*;
pub use keys::*;
pub use log::*;
pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Errors from a single storage channel
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for ChannelError {
    fn from(e: rusqlite::Error) -> Self {
        ChannelError::Database(e.to_string())
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No channel accepted {operation} of '{key}'")]
    AllChannelsFailed { operation: &'static str, key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
