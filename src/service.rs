//! Public service API, wiring C1-C6 together through a [`WatchdogContext`]:
//! a thin struct of methods over a shared context, each method doing exactly
//! one cross-component operation and nothing else.

use crate::context::WatchdogContext;
use crate::error::{WatchdogError, WatchdogResult};
use crate::overuse::OveruseListener;
use crate::types::{
    CallbackHandle, DaemonInboundEvent, OveruseConfiguration, PackageIoOveruseStats, PackageRecord,
    ResourceOveruseFlags, ResourceOveruseStats, Tier, UserPackageKey,
};
use chrono::NaiveDate;
use std::sync::Arc;

/// Window over which query APIs report stats — mirrors the platform's
/// `StatsPeriod` constants (current day vs. a trailing historical window).
#[derive(Debug, Clone, Copy)]
pub enum StatsPeriod {
    Current,
    PastDays(i64),
}

/// `WatchdogService`: the entry point in-process clients and the daemon
/// liaison's inbound dispatch both call through.
pub struct WatchdogService {
    context: Arc<WatchdogContext>,
}

impl WatchdogService {
    pub fn new(context: Arc<WatchdogContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<WatchdogContext> {
        &self.context
    }

    // -- Health-check client registration (C5) --------------------------

    pub fn register_client(
        &self,
        handle: CallbackHandle,
        pid: i32,
        user_id: i32,
        tier: Tier,
    ) -> WatchdogResult<()> {
        self.context
            .health
            .register_client(handle, pid, user_id, tier)
            .map_err(WatchdogError::from)
    }

    pub fn unregister_client(&self, handle: CallbackHandle) {
        self.context.health.unregister_client(handle);
    }

    pub fn tell_client_alive(&self, handle: CallbackHandle, session_id: u32) -> bool {
        self.context.health.tell_client_alive(handle, session_id)
    }

    // -- Query APIs (C4) -------------------------------------------------

    /// `getResourceOveruseStats`: one caller's own uid's current stats, or
    /// a historical rollup when `period` names a trailing window.
    pub fn get_resource_overuse_stats(
        &self,
        uid: i32,
        generic_package_name: &str,
        period: StatsPeriod,
    ) -> WatchdogResult<Option<ResourceOveruseStats>> {
        match period {
            StatsPeriod::Current => {
                let key = UserPackageKey::new(
                    crate::classifier::user_id_for_uid(uid),
                    generic_package_name,
                );
                Ok(self.context.overuse.snapshot_stats(&key))
            }
            StatsPeriod::PastDays(num_days_ago) => self.historical_stats(
                crate::classifier::user_id_for_uid(uid),
                generic_package_name,
                num_days_ago,
            ),
        }
    }

    /// `getResourceOveruseStatsForUserPackage`: same lookup, addressed
    /// directly by (userId, genericPackageName) rather than uid.
    pub fn get_resource_overuse_stats_for_user_package(
        &self,
        generic_package_name: &str,
        user_id: i32,
        period: StatsPeriod,
    ) -> WatchdogResult<Option<ResourceOveruseStats>> {
        match period {
            StatsPeriod::Current => {
                let key = UserPackageKey::new(user_id, generic_package_name);
                Ok(self.context.overuse.snapshot_stats(&key))
            }
            StatsPeriod::PastDays(num_days_ago) => {
                self.historical_stats(user_id, generic_package_name, num_days_ago)
            }
        }
    }

    fn historical_stats(
        &self,
        user_id: i32,
        generic_package_name: &str,
        num_days_ago: i64,
    ) -> WatchdogResult<Option<ResourceOveruseStats>> {
        let today = chrono::Utc::now().date_naive();
        let historical = self.context.store.get_historical_io_overuse_stats(
            user_id,
            generic_package_name,
            num_days_ago,
            today,
        )?;
        Ok(historical.map(|h| ResourceOveruseStats {
            user_id,
            generic_package_name: generic_package_name.to_string(),
            io_overuse_stats: crate::types::IoOveruseStats {
                killable_on_overuse: true,
                written_bytes: h.written_bytes,
                remaining_write_bytes: crate::types::PerStateBytes::ZERO,
                total_overuses: h.total_overuses,
            },
        }))
    }

    /// `getAllResourceOveruseStats`: every tracked package, optionally
    /// filtered to those whose current-day written bytes meet
    /// `min_total_written_bytes` (the `minimumStatsFlag` gate).
    pub fn get_all_resource_overuse_stats(
        &self,
        min_total_written_bytes: Option<u64>,
    ) -> Vec<ResourceOveruseStats> {
        let all = self.context.overuse.all_stats();
        match min_total_written_bytes {
            None => all,
            Some(min) => all
                .into_iter()
                .filter(|s| {
                    let w = s.io_overuse_stats.written_bytes;
                    w.foreground_bytes
                        .saturating_add(w.background_bytes)
                        .saturating_add(w.garage_mode_bytes)
                        >= min
                })
                .collect(),
        }
    }

    // -- Listeners (C4) ---------------------------------------------------

    pub fn add_resource_overuse_listener(
        &self,
        uid: i32,
        handle: u64,
        listener: Arc<dyn OveruseListener>,
    ) -> WatchdogResult<()> {
        self.context.overuse.add_per_uid_listener(uid, handle, listener)
    }

    pub fn add_resource_overuse_listener_for_system(
        &self,
        handle: u64,
        listener: Arc<dyn OveruseListener>,
    ) -> WatchdogResult<()> {
        self.context.overuse.add_system_listener(handle, listener)
    }

    pub fn remove_resource_overuse_listener(&self, handle: u64) {
        self.context.overuse.remove_listener(handle);
    }

    // -- Killable-state API (C4) ------------------------------------------

    pub fn set_killable_package_as_user(
        &self,
        generic_package_name: &str,
        user_id: i32,
        is_killable: bool,
    ) -> WatchdogResult<()> {
        self.context
            .overuse
            .set_killable_package_as_user(generic_package_name, user_id, is_killable)
    }

    /// `getPackageKillableStatesAsUser`.
    pub fn get_package_killable_states_as_user(
        &self,
        user_id: i32,
    ) -> Vec<(UserPackageKey, crate::types::KillableState)> {
        self.context.overuse.get_package_killable_states_as_user(user_id)
    }

    // -- Configuration (C1 + C6) -------------------------------------------

    /// Validates the batch, applies it to the local threshold cache, and
    /// pushes it to the daemon (stash-and-succeed when disconnected,
    /// propagate when the transport rejects it as too large).
    pub async fn set_resource_overuse_configurations(
        &self,
        configs: Vec<OveruseConfiguration>,
        flags: ResourceOveruseFlags,
    ) -> WatchdogResult<()> {
        crate::overuse::validate_configs(&configs, flags)?;
        self.context.threshold_cache.set(configs.clone());
        self.context
            .daemon
            .set_resource_overuse_configurations(configs, flags)
            .await
            .map_err(WatchdogError::from)
    }

    pub async fn get_resource_overuse_configurations(
        &self,
        flags: ResourceOveruseFlags,
    ) -> WatchdogResult<Vec<OveruseConfiguration>> {
        self.context
            .daemon
            .get_resource_overuse_configurations(flags)
            .await
            .map_err(WatchdogError::from)
    }

    pub fn reset_resource_overuse_stats(&self, package_names: &[String]) -> WatchdogResult<()> {
        self.context.overuse.reset_resource_overuse_stats(package_names)
    }

    // -- Daemon-inbound dispatch ------------------------------------------

    /// `latestIoOveruseStats`: a daemon stats push, routed to C4.
    pub fn ingest_io_overuse_stats(
        &self,
        stats: Vec<PackageIoOveruseStats>,
        today: NaiveDate,
    ) -> WatchdogResult<()> {
        self.context.overuse.ingest_stats(stats, today)
    }

    /// `getPackageInfosForUids`: the daemon resolving uids via the
    /// watchdog's own package-manager binding.
    pub fn get_package_infos_for_uids(&self, uids: &[i32]) -> Vec<(i32, PackageRecord)> {
        self.context.overuse.resolve_package_infos(uids)
    }

    /// Routes one inbound daemon event to its subsystem. `checkIfAlive` has
    /// no case here: this crate drives each health-check tier off its own
    /// fixed-period timer instead of ad hoc daemon pings, and
    /// `prepareProcessTermination` is invoked directly on the non-responding
    /// client by the tier loop, not dispatched through here.
    pub fn handle_daemon_event(
        &self,
        event: DaemonInboundEvent,
        today: NaiveDate,
    ) -> WatchdogResult<Option<Vec<(i32, PackageRecord)>>> {
        match event {
            DaemonInboundEvent::LatestIoOveruseStats { stats } => {
                self.ingest_io_overuse_stats(stats, today)?;
                Ok(None)
            }
            DaemonInboundEvent::GetPackageInfosForUids { uids, .. } => {
                Ok(Some(self.get_package_infos_for_uids(&uids)))
            }
            DaemonInboundEvent::CheckIfAlive { .. } | DaemonInboundEvent::PrepareProcessTermination => {
                Ok(None)
            }
        }
    }
}
