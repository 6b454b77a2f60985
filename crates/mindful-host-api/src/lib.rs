//! Host effect trait interfaces for mindful
//!
//! This crate defines the interface between the core and the platform: the
//! enforcement mechanism, the OS activity scheduler, notification delivery and
//! the external approval service. It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
