//! Wire-adjacent types exchanged with the (opaque, external) native daemon.

use super::package::PerStateBytes;

/// One package's I/O overuse stats push from the daemon.
#[derive(Debug, Clone)]
pub struct PackageIoOveruseStats {
    pub uid: i32,
    pub should_notify: bool,
    pub killable_on_overuse: bool,
    pub written_bytes: PerStateBytes,
    pub remaining_write_bytes: PerStateBytes,
    pub total_overuses: u64,
    pub start_time: i64,
    pub duration_in_seconds: i64,
}

/// Outcome of the action-decision table evaluated on each stats push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OveruseActionKind {
    NotKilled,
    NotKilledUserOpted,
    Killed,
    KilledRecurringOveruse,
}

/// One pending action record, queued by the overuse engine and drained to
/// the daemon in FIFO order via `actionTakenOnResourceOveruse`.
#[derive(Debug, Clone)]
pub struct OveruseAction {
    pub uid: i32,
    pub generic_package_name: String,
    pub member_packages: Vec<String>,
    pub kind: OveruseActionKind,
}

/// Inbound requests the daemon may issue. Modeled as a tagged union rather
/// than an integer-with-constants; the daemon liaison and health-check
/// scheduler pattern-match on this to dispatch to the right subsystem.
#[derive(Debug, Clone)]
pub enum DaemonInboundEvent {
    CheckIfAlive {
        session_id: u32,
        tier: super::client::Tier,
    },
    PrepareProcessTermination,
    GetPackageInfosForUids {
        uids: Vec<i32>,
        vendor_prefixes: Vec<String>,
    },
    LatestIoOveruseStats {
        stats: Vec<PackageIoOveruseStats>,
    },
}

/// System state transitions forwarded by the daemon liaison into C4/C5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStateChange {
    PowerCycleResume,
    PowerCycleSuspend,
    UserStateStarted(i32),
    UserStateStopped(i32),
    UserRemoved(i32),
}
