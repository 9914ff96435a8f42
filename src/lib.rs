//! Automotive resource-overuse watchdog.
//!
//! Long-running supervisor that polls in-process clients for liveness on
//! three timeout tiers, ingests per-package I/O write statistics from a
//! trusted native daemon, evaluates them against a hierarchical threshold
//! configuration, and decides per package whether to forgive, notify, or
//! terminate.

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod daemon_link;
pub mod error;
pub mod health;
pub mod overuse;
pub mod service;
pub mod store;
pub mod threshold_cache;
pub mod types;

pub use context::{ServiceHandle, WatchdogContext, WatchdogStateSnapshot};
pub use error::{WatchdogError, WatchdogResult};
pub use service::{StatsPeriod, WatchdogService};
