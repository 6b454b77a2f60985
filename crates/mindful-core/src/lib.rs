//! Core of mindful: temporary unblocking with guaranteed reblocking
//!
//! This crate contains:
//! - The policy engine (universe, exemptions and grants -> blocked set)
//! - The grant lifecycle manager (unblock, persist, arm both triggers)
//! - Expiry reconciliation, safe to run from any process any number of times
//! - In-process reblock timers and the startup/resume reconciler
//! - Handlers for the shield and monitor processes
//! - Processing of pending unlock requests

mod components;
mod events;
mod grants;
mod monitor;
mod policy;
mod reconcile;
mod requests;
mod resume;
mod shield;
mod timers;

#[cfg(test)]
mod testing;

pub use components::*;
pub use events::*;
pub use grants::*;
pub use monitor::*;
pub use policy::*;
pub use reconcile::*;
pub use requests::*;
pub use resume::*;
pub use shield::*;
pub use timers::*;

use chrono::{DateTime, Local};
use mindful_host_api::HostError;
use mindful_store::{Store, StoreError};
use mindful_util::MindfulError;
use std::sync::Arc;
use thiserror::Error;

/// Errors from core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Run synchronous store work on the blocking pool.
///
/// Channel writes can stall (file locks, the SQLite busy timeout); kept off
/// the async workers, a stalled write cannot hold up timers or deadlines.
pub(crate) async fn with_store<T, F>(store: &Arc<dyn Store>, work: F) -> CoreResult<T>
where
    F: FnOnce(&dyn Store) -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || work(store.as_ref())).await?
}

/// Errors that stop a grant before anything is written
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("{0}")]
    Decode(#[from] MindfulError),

    #[error("Invalid duration: {0} minutes")]
    InvalidDuration(u32),

    #[error("Already unblocked until {expires_at}")]
    AlreadyGranted { expires_at: DateTime<Local> },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type GrantResult<T> = Result<T, GrantError>;

/// Which of the three processes a component runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The main application process
    Main,
    /// Short-lived process started by the OS scheduler
    Monitor,
    /// Short-lived process answering block screen button presses
    Shield,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessRole::Main => "main",
            ProcessRole::Monitor => "monitor",
            ProcessRole::Shield => "shield",
        }
    }
}
