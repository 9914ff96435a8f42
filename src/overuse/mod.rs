//! Overuse Accounting Engine (C4). The largest component: ingests daemon
//! stats pushes, owns the in-memory usage map and pending action queue
//! exclusively, and serves the killable-state and query APIs.

pub mod configuration;
mod ingestion;
pub mod listeners;
pub mod recurring;

pub use configuration::validate_configs;
pub use listeners::{ListenerError, ListenerRegistry, OveruseListener};
pub use recurring::{RecurringOveruseCheck, ThresholdRecurringOveruseCheck};

use crate::classifier::{PackageClassifier, PackageInfoProvider};
use crate::collaborators::PackageEnableStateController;
use crate::error::WatchdogError;
use crate::store::StatsStore;
use crate::threshold_cache::ThresholdConfigurationCache;
use crate::types::{
    ComponentType, DefaultNotKillableSet, IoOveruseStats, KillableState, PackageResourceUsage,
    ResourceOveruseStats, UserPackageKey,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OveruseError {
    #[error("{0}")]
    Invalid(String),
}

pub(crate) struct EngineState {
    pub usage: HashMap<UserPackageKey, PackageResourceUsage>,
    pub default_not_killable: DefaultNotKillableSet,
    pub pending_actions: Vec<crate::types::OveruseAction>,
    pub last_report_day: Option<NaiveDate>,
}

/// C4: the overuse accounting engine.
pub struct OveruseEngine<P, E, R>
where
    P: PackageInfoProvider,
    E: PackageEnableStateController,
    R: RecurringOveruseCheck,
{
    pub(crate) classifier: PackageClassifier<P>,
    pub(crate) threshold_cache: Arc<ThresholdConfigurationCache>,
    pub(crate) store: Arc<StatsStore>,
    pub(crate) enable_state: E,
    pub(crate) recurring_check: R,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) listeners: Mutex<ListenerRegistry>,
    pub(crate) retention_days: i64,
}

impl<P, E, R> OveruseEngine<P, E, R>
where
    P: PackageInfoProvider,
    E: PackageEnableStateController,
    R: RecurringOveruseCheck,
{
    pub fn new(
        provider: P,
        threshold_cache: Arc<ThresholdConfigurationCache>,
        store: Arc<StatsStore>,
        enable_state: E,
        recurring_check: R,
        retention_days: i64,
    ) -> Self {
        Self {
            classifier: PackageClassifier::new(provider),
            threshold_cache,
            store,
            enable_state,
            recurring_check,
            state: Mutex::new(EngineState {
                usage: HashMap::new(),
                default_not_killable: DefaultNotKillableSet::new(),
                pending_actions: Vec::new(),
                last_report_day: None,
            }),
            listeners: Mutex::new(ListenerRegistry::default()),
            retention_days,
        }
    }

    /// Initialization pipeline: load settings and today-usage from C3,
    /// populate the default-not-killable set from rows with
    /// `KillableState::No`, replay today-usage into in-memory accounting.
    /// Requesting the safe-to-kill set from the daemon and registering
    /// date/package-change listeners are handled by `WatchdogContext` at
    /// startup (C6 and the OS package-change broadcaster are both out of
    /// scope collaborators here).
    pub fn load_from_store(&self, today: NaiveDate) -> Result<(), WatchdogError> {
        let settings = self.store.list_user_package_settings()?;
        let mut state = self.state.lock().expect("lock");
        for (key, killable_state) in &settings {
            if *killable_state == KillableState::No {
                state.default_not_killable.insert(key.generic_package_name.clone());
            }
        }

        let today_rows = self.store.get_today_io_usage_stats(today)?;
        for (key, usage) in today_rows {
            let killable_state = settings
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, s)| *s)
                .unwrap_or(KillableState::Yes);
            let mut entry = PackageResourceUsage::new(
                key.user_id,
                key.generic_package_name.clone(),
                Vec::new(),
            );
            entry.row_id = self.store.row_id(&key);
            entry.killable_state = killable_state;
            entry.written_bytes = usage.written_bytes;
            entry.remaining_write_bytes = usage
                .remaining_write_bytes
                .unwrap_or(crate::types::PerStateBytes::DEFAULT_THRESHOLD);
            entry.forgiven_write_bytes = usage.forgiven_write_bytes.unwrap_or_default();
            entry.total_overuses = usage.total_overuses;
            entry.forgiven_overuses = usage.forgiven_overuses;
            entry.total_times_killed = usage.total_times_killed;
            state.usage.insert(key, entry);
        }
        state.last_report_day = Some(today);
        info!(packages = state.usage.len(), "overuse engine initialized from store");
        Ok(())
    }

    /// `resetResourceOveruseStats(pkgNames)` — zeroes in-memory counters and
    /// current-day store rows for the named packages (or every package, when
    /// the list is empty).
    pub fn reset_resource_overuse_stats(&self, package_names: &[String]) -> Result<(), WatchdogError> {
        let mut state = self.state.lock().expect("lock");
        let mut entries = Vec::new();
        for (key, usage) in state.usage.iter_mut() {
            if !package_names.is_empty() && !package_names.contains(&key.generic_package_name) {
                continue;
            }
            usage.reset_for_new_day();
            entries.push(crate::store::IoUsageStatsEntry {
                key: key.clone(),
                usage: crate::types::DailyIoUsage {
                    date: state.last_report_day.unwrap_or_else(today_fallback),
                    total_overuses: 0,
                    forgiven_overuses: 0,
                    total_times_killed: usage.total_times_killed,
                    written_bytes: crate::types::PerStateBytes::ZERO,
                    remaining_write_bytes: Some(usage.remaining_write_bytes),
                    forgiven_write_bytes: Some(crate::types::PerStateBytes::ZERO),
                },
            });
        }
        drop(state);
        self.store.save_io_usage_stats(&entries, false, self.retention_days, today_fallback())?;
        Ok(())
    }

    /// `getPackageInfosForUids` — the daemon asks the watchdog to resolve
    /// uids back to package records rather than carrying its own
    /// package-manager binding.
    pub fn resolve_package_infos(
        &self,
        uids: &[i32],
    ) -> Vec<(i32, crate::types::PackageRecord)> {
        self.classifier.lookup_many(uids)
    }

    pub fn drain_pending_actions(&self) -> Vec<crate::types::OveruseAction> {
        std::mem::take(&mut self.state.lock().expect("lock").pending_actions)
    }

    pub fn snapshot_stats(&self, key: &UserPackageKey) -> Option<ResourceOveruseStats> {
        let state = self.state.lock().expect("lock");
        state.usage.get(key).map(|usage| ResourceOveruseStats {
            user_id: usage.user_id,
            generic_package_name: usage.generic_package_name.clone(),
            io_overuse_stats: IoOveruseStats {
                killable_on_overuse: usage.killable_state != KillableState::Never,
                written_bytes: usage.written_bytes,
                remaining_write_bytes: usage.remaining_write_bytes,
                total_overuses: usage.total_overuses,
            },
        })
    }

    pub fn all_stats(&self) -> Vec<ResourceOveruseStats> {
        let state = self.state.lock().expect("lock");
        state
            .usage
            .values()
            .map(|usage| ResourceOveruseStats {
                user_id: usage.user_id,
                generic_package_name: usage.generic_package_name.clone(),
                io_overuse_stats: IoOveruseStats {
                    killable_on_overuse: usage.killable_state != KillableState::Never,
                    written_bytes: usage.written_bytes,
                    remaining_write_bytes: usage.remaining_write_bytes,
                    total_overuses: usage.total_overuses,
                },
            })
            .collect()
    }

    /// `setKillablePackageAsUser`. `user_id = -1` is the "all users"
    /// sentinel.
    pub fn set_killable_package_as_user(
        &self,
        generic_package_name: &str,
        user_id: i32,
        is_killable: bool,
    ) -> Result<(), WatchdogError> {
        const ALL_USERS: i32 = -1;
        let mut state = self.state.lock().expect("lock");
        let new_state = if is_killable { KillableState::Yes } else { KillableState::No };

        if user_id == ALL_USERS {
            // Only touches keys with an existing tracked usage row, not
            // every live user for this package — a package with no usage
            // row yet has nothing to flip in-memory, so it falls straight
            // through to the unknown-package rejection below.
            let mut touched_any = false;
            for (key, usage) in state.usage.iter_mut() {
                if key.generic_package_name != generic_package_name {
                    continue;
                }
                if usage.killable_state == KillableState::Never {
                    return Err(WatchdogError::InvalidArgument(
                        "cannot change killable state of a Never-killable package".to_string(),
                    ));
                }
                usage.killable_state = new_state;
                touched_any = true;
            }
            if !touched_any {
                return Err(WatchdogError::InvalidArgument(format!(
                    "unknown package {generic_package_name}"
                )));
            }
            if is_killable {
                state.default_not_killable.remove(generic_package_name);
            } else {
                state.default_not_killable.insert(generic_package_name.to_string());
            }
            return Ok(());
        }

        let key = UserPackageKey::new(user_id, generic_package_name);
        let usage = state
            .usage
            .get_mut(&key)
            .ok_or_else(|| WatchdogError::InvalidArgument(format!("unknown package {generic_package_name}")))?;
        if usage.killable_state == KillableState::Never {
            return Err(WatchdogError::InvalidArgument(
                "cannot change killable state of a Never-killable package".to_string(),
            ));
        }
        usage.killable_state = new_state;
        Ok(())
    }

    /// `getPackageKillableStatesAsUser`: enumerate known packages for
    /// `user_id` (or every user, for the "all users" sentinel `-1`),
    /// re-derive `isSafeToKill` from C1 using each entry's stored
    /// componentType and shared-uid membership, and resolve through
    /// `syncAndFetchKillableState`.
    pub fn get_package_killable_states_as_user(
        &self,
        user_id: i32,
    ) -> Vec<(UserPackageKey, KillableState)> {
        const ALL_USERS: i32 = -1;
        let keys: Vec<(UserPackageKey, ComponentType, Vec<String>)> = {
            let state = self.state.lock().expect("lock");
            state
                .usage
                .values()
                .filter(|u| user_id == ALL_USERS || u.user_id == user_id)
                .map(|u| {
                    (
                        UserPackageKey::new(u.user_id, u.generic_package_name.clone()),
                        u.component_type,
                        u.member_packages.clone(),
                    )
                })
                .collect()
        };

        keys.into_iter()
            .map(|(key, component_type, member_packages)| {
                let is_safe_to_kill = self.threshold_cache.is_safe_to_kill(
                    &key.generic_package_name,
                    component_type,
                    &member_packages,
                );
                let state =
                    self.sync_and_fetch_killable_state(&key, component_type, is_safe_to_kill);
                (key, state)
            })
            .collect()
    }

    /// `getPackageKillableStatesAsUser`'s per-package resolution step,
    /// `syncAndFetchKillableState`.
    pub fn sync_and_fetch_killable_state(
        &self,
        key: &UserPackageKey,
        component_type: ComponentType,
        is_safe_to_kill: bool,
    ) -> KillableState {
        let mut state = self.state.lock().expect("lock");
        let entry = state
            .usage
            .entry(key.clone())
            .or_insert_with(|| PackageResourceUsage::new(key.user_id, key.generic_package_name.clone(), Vec::new()));

        if component_type != ComponentType::ThirdParty && !is_safe_to_kill {
            entry.killable_state = KillableState::Never;
        } else if entry.killable_state == KillableState::Never && is_safe_to_kill && component_type != ComponentType::ThirdParty {
            entry.killable_state = if state.default_not_killable.contains(&key.generic_package_name) {
                KillableState::No
            } else {
                KillableState::Yes
            };
        }
        entry.killable_state
    }
}

fn today_fallback() -> NaiveDate {
    // Only reached when `reset_resource_overuse_stats` is called before the
    // engine has ever ingested a batch (no `last_report_day` yet); falls
    // back to the epoch date rather than calling a wall-clock API the
    // engine otherwise never touches directly.
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid constant date")
}
