//! Runtime configuration.
//!
//! Deliberately not a process-wide global behind a `OnceLock`, even though
//! that is a common shape for this kind of settings struct: `WatchdogConfig`
//! is an owned value threaded through [`crate::context::WatchdogContext`]
//! instead, replacing global mutable state with a context value passed to
//! every component rather than a `OnceLock` global that panics on
//! double-init.

use std::path::PathBuf;
use std::time::Duration;

/// Health-check tier deadlines, overridable for tests (production uses
/// fixed 3s/5s/10s periods).
#[derive(Debug, Clone, Copy)]
pub struct TierDeadlines {
    pub critical: Duration,
    pub moderate: Duration,
    pub normal: Duration,
}

impl Default for TierDeadlines {
    fn default() -> Self {
        Self {
            critical: Duration::from_secs(3),
            moderate: Duration::from_secs(5),
            normal: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub data_dir: PathBuf,
    pub retention_days: i64,
    pub tier_deadlines: TierDeadlines,
    pub daemon_reconnect_interval: Duration,
    pub daemon_max_immediate_retries: u32,
    pub recurring_min_overuses: u64,
    pub recurring_window_days: i64,
}

impl WatchdogConfig {
    /// Database path, derived from `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("watchdog.db")
    }

    /// Load from environment: each setting reads its own env var with a
    /// hardcoded fallback default, no config file format.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("IO_WATCHDOG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        Self {
            data_dir,
            retention_days: 30,
            tier_deadlines: TierDeadlines::default(),
            daemon_reconnect_interval: Duration::from_millis(500),
            daemon_max_immediate_retries: 3,
            recurring_min_overuses: 3,
            recurring_window_days: 30,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
