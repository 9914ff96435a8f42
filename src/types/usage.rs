//! Daily and in-memory usage accounting types.

use super::package::{ComponentType, PerStateBytes};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per (`UserPackage`, UTC day) usage row, as persisted by the stats store (C3).
///
/// `remaining_write_bytes` and `forgiven_write_bytes` are only meaningful for
/// the current day; historical rows (date < today) always carry `None` for
/// both, per the retention/history-trimming invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyIoUsage {
    pub date: NaiveDate,
    pub total_overuses: u64,
    pub forgiven_overuses: u64,
    pub total_times_killed: u64,
    pub written_bytes: PerStateBytes,
    pub remaining_write_bytes: Option<PerStateBytes>,
    pub forgiven_write_bytes: Option<PerStateBytes>,
}

impl DailyIoUsage {
    pub fn is_historical(&self) -> bool {
        self.remaining_write_bytes.is_none() && self.forgiven_write_bytes.is_none()
    }
}

/// Enable state of a package as last observed from the package-manager
/// collaborator, used to remember the pre-disable state for later
/// conditional re-enable (spec §4.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnabledState {
    Enabled,
    Disabled,
    DisabledUser,
    DisabledUntilUsed,
}

/// In-memory running usage for one `UserPackage`, keyed by
/// `UserPackageKey::composite_key()` in the overuse engine's usage map.
#[derive(Debug, Clone)]
pub struct PackageResourceUsage {
    pub user_id: i32,
    pub generic_package_name: String,
    /// Stable storage row id, assigned on first persistence.
    pub row_id: Option<i64>,
    pub killable_state: super::package::KillableState,
    /// Resolved at ingestion time via C2; used by `getPackageKillableStatesAsUser`
    /// to re-derive `isSafeToKill` without a second classifier round-trip.
    pub component_type: ComponentType,
    pub member_packages: Vec<String>,
    pub written_bytes: PerStateBytes,
    pub remaining_write_bytes: PerStateBytes,
    pub forgiven_write_bytes: PerStateBytes,
    pub total_overuses: u64,
    pub forgiven_overuses: u64,
    pub total_times_killed: u64,
    /// Pre-disable enabled state per member package, recorded on a
    /// non-recurring disable action so it can be restored on date rollover
    /// if the package is still `DisabledUntilUsed`.
    pub remembered_enabled_state: HashMap<String, EnabledState>,
}

impl PackageResourceUsage {
    pub fn new(user_id: i32, generic_package_name: String, member_packages: Vec<String>) -> Self {
        Self {
            user_id,
            generic_package_name,
            row_id: None,
            killable_state: super::package::KillableState::Yes,
            component_type: ComponentType::ThirdParty,
            member_packages,
            written_bytes: PerStateBytes::ZERO,
            remaining_write_bytes: PerStateBytes::DEFAULT_THRESHOLD,
            forgiven_write_bytes: PerStateBytes::ZERO,
            total_overuses: 0,
            forgiven_overuses: 0,
            total_times_killed: 0,
            remembered_enabled_state: HashMap::new(),
        }
    }

    /// Reset the counters that are scoped to a single calendar day. Called
    /// on date rollover after the closing day's row has been persisted.
    pub fn reset_for_new_day(&mut self) {
        self.written_bytes = PerStateBytes::ZERO;
        self.remaining_write_bytes = PerStateBytes::DEFAULT_THRESHOLD;
        self.forgiven_write_bytes = PerStateBytes::ZERO;
        self.total_overuses = 0;
        self.forgiven_overuses = 0;
    }
}

/// Public snapshot of one package's current stats, returned by query APIs
/// and delivered to listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoOveruseStats {
    pub killable_on_overuse: bool,
    pub written_bytes: PerStateBytes,
    pub remaining_write_bytes: PerStateBytes,
    pub total_overuses: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOveruseStats {
    pub user_id: i32,
    pub generic_package_name: String,
    pub io_overuse_stats: IoOveruseStats,
}
