//! Shared utilities for mindful
//!
//! This crate provides:
//! - ID types (ItemToken, GrantId, CorrelationName, RequestId)
//! - Time utilities (wall clock with mock support, injectable clocks)
//! - Error types
//! - Default paths for the config file and data directory

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
