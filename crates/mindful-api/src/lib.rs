//! Serialized-state contract for mindful
//!
//! The main app, the monitor, and the shield process never talk to each
//! other directly. Everything they exchange goes through the store in the
//! shapes defined here:
//! - Grants, pending requests, grant history
//! - Approval requests and decisions
//! - Notifications, lifecycle callbacks, shield actions

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;
