//! Stats ingestion, date rollover, and listener registration.

use super::OveruseEngine;
use crate::classifier::{user_id_for_uid, PackageInfoProvider};
use crate::collaborators::PackageEnableStateController;
use crate::error::WatchdogError;
use crate::overuse::listeners::OveruseListener;
use crate::overuse::recurring::RecurringOveruseCheck;
use crate::store::IoUsageStatsEntry;
use crate::types::{
    DailyIoUsage, EnabledState, IoOveruseStats, KillableState, OveruseAction, OveruseActionKind,
    PackageIoOveruseStats, PackageResourceUsage, PerStateBytes, ResourceOveruseStats,
    UserPackageKey,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

impl<P, E, R> OveruseEngine<P, E, R>
where
    P: PackageInfoProvider,
    E: PackageEnableStateController,
    R: RecurringOveruseCheck,
{
    /// Ingest a daemon stats batch.
    pub fn ingest_stats(
        &self,
        stats: Vec<PackageIoOveruseStats>,
        today: NaiveDate,
    ) -> Result<(), WatchdogError> {
        self.check_and_handle_date_rollover(today)?;

        let vendor_prefixes = self.threshold_cache.vendor_prefixes();
        for entry in stats {
            let classification = match self.classifier.component_type(entry.uid, &vendor_prefixes) {
                Ok(c) => c,
                Err(_) => {
                    warn!(uid = entry.uid, "dropping stats push, uid has no package mapping");
                    continue;
                }
            };
            let user_id = user_id_for_uid(entry.uid);
            let key = UserPackageKey::new(user_id, classification.generic_package_name.clone());

            let is_new = !self.state.lock().expect("lock").usage.contains_key(&key);
            if is_new {
                self.store.save_user_package_settings(&[crate::store::UserPackageSettingsEntry {
                    key: key.clone(),
                    killable_state: KillableState::Yes,
                }])?;
            }
            let row_id = self.store.row_id(&key);

            // Step 3/4: update or insert the usage row, reconcile KillableState.
            let (killable_state, member_packages) = {
                let mut state = self.state.lock().expect("lock");
                let usage = state.usage.entry(key.clone()).or_insert_with(|| {
                    PackageResourceUsage::new(
                        user_id,
                        classification.generic_package_name.clone(),
                        classification.member_packages.clone(),
                    )
                });
                usage.row_id = row_id;
                usage.component_type = classification.component_type;
                usage.member_packages = classification.member_packages.clone();
                usage.written_bytes = entry.written_bytes;
                usage.remaining_write_bytes = entry.remaining_write_bytes;
                usage.total_overuses = entry.total_overuses;

                if !entry.killable_on_overuse {
                    usage.killable_state = KillableState::Never;
                } else if usage.killable_state == KillableState::Never {
                    usage.killable_state = if state.default_not_killable.contains(&key.generic_package_name) {
                        KillableState::No
                    } else {
                        KillableState::Yes
                    };
                }
                let usage = state.usage.get(&key).expect("present");
                (usage.killable_state, usage.member_packages.clone())
            };

            if entry.should_notify {
                let snapshot = {
                    let state = self.state.lock().expect("lock");
                    let usage = state.usage.get(&key).expect("present");
                    ResourceOveruseStats {
                        user_id,
                        generic_package_name: key.generic_package_name.clone(),
                        io_overuse_stats: IoOveruseStats {
                            killable_on_overuse: killable_state != KillableState::Never,
                            written_bytes: usage.written_bytes,
                            remaining_write_bytes: usage.remaining_write_bytes,
                            total_overuses: usage.total_overuses,
                        },
                    }
                };
                self.listeners.lock().expect("lock").dispatch(entry.uid, snapshot);
            }

            // Step 6/7: action-decision table, only when a state is exhausted.
            if entry.remaining_write_bytes.any_state_exhausted() {
                let not_forgiven = match row_id {
                    Some(id) => self
                        .store
                        .get_not_forgiven_historical_io_overuses(self.recurring_check.window_days(), today)?
                        .get(&id)
                        .copied()
                        .unwrap_or(0),
                    None => 0,
                };
                let recurring = self.recurring_check.is_recurring(not_forgiven);
                let any_member_disabled = member_packages.iter().any(|m| {
                    matches!(
                        self.enable_state.enabled_state(m, user_id),
                        EnabledState::Disabled | EnabledState::DisabledUser | EnabledState::DisabledUntilUsed
                    )
                });

                let kind = if killable_state == KillableState::Never {
                    OveruseActionKind::NotKilled
                } else if killable_state == KillableState::No && !recurring {
                    OveruseActionKind::NotKilledUserOpted
                } else if recurring {
                    for member in &member_packages {
                        self.enable_state.set_enabled_state(member, user_id, EnabledState::Disabled);
                    }
                    OveruseActionKind::KilledRecurringOveruse
                } else if any_member_disabled {
                    OveruseActionKind::NotKilled
                } else {
                    let mut state = self.state.lock().expect("lock");
                    let usage = state.usage.get_mut(&key).expect("present");
                    for member in &member_packages {
                        let previous = self.enable_state.enabled_state(member, user_id);
                        usage.remembered_enabled_state.insert(member.clone(), previous);
                    }
                    drop(state);
                    for member in &member_packages {
                        self.enable_state
                            .set_enabled_state(member, user_id, EnabledState::DisabledUntilUsed);
                    }
                    OveruseActionKind::Killed
                };

                if matches!(kind, OveruseActionKind::Killed | OveruseActionKind::KilledRecurringOveruse) {
                    let mut state = self.state.lock().expect("lock");
                    if let Some(usage) = state.usage.get_mut(&key) {
                        usage.total_times_killed += 1;
                    }
                }

                let mut state = self.state.lock().expect("lock");
                state.pending_actions.push(OveruseAction {
                    uid: entry.uid,
                    generic_package_name: key.generic_package_name.clone(),
                    member_packages: member_packages.clone(),
                    kind,
                });
            }
        }
        Ok(())
    }

    /// Persist the closing day, reset in-memory counters, conditionally
    /// re-enable, advance the stored UTC day. Idempotent within a day.
    pub fn check_and_handle_date_rollover(&self, today: NaiveDate) -> Result<(), WatchdogError> {
        let mut state = self.state.lock().expect("lock");
        let last_day = state.last_report_day;
        if last_day == Some(today) {
            return Ok(());
        }
        let closing_day = match last_day {
            Some(day) => day,
            None => {
                state.last_report_day = Some(today);
                return Ok(());
            }
        };

        let entries: Vec<IoUsageStatsEntry> = state
            .usage
            .iter()
            .map(|(key, usage)| IoUsageStatsEntry {
                key: key.clone(),
                usage: DailyIoUsage {
                    date: closing_day,
                    total_overuses: usage.total_overuses,
                    forgiven_overuses: usage.forgiven_overuses,
                    total_times_killed: usage.total_times_killed,
                    written_bytes: usage.written_bytes,
                    remaining_write_bytes: None,
                    forgiven_write_bytes: None,
                },
            })
            .collect();
        drop(state);
        self.store
            .save_io_usage_stats(&entries, true, self.retention_days, today)?;

        let mut state = self.state.lock().expect("lock");
        let user_ids_and_keys: Vec<(i32, String, Vec<String>)> = state
            .usage
            .values()
            .map(|u| (u.user_id, u.generic_package_name.clone(), u.member_packages.clone()))
            .collect();
        for usage in state.usage.values_mut() {
            usage.reset_for_new_day();
        }
        drop(state);

        for (user_id, _generic_name, members) in user_ids_and_keys {
            for member in members {
                if self.enable_state.enabled_state(&member, user_id) == EnabledState::DisabledUntilUsed {
                    let mut state = self.state.lock().expect("lock");
                    let remembered = state
                        .usage
                        .values_mut()
                        .find(|u| u.member_packages.contains(&member))
                        .and_then(|u| u.remembered_enabled_state.remove(&member));
                    drop(state);
                    if let Some(previous) = remembered {
                        self.enable_state.set_enabled_state(&member, user_id, previous);
                    }
                }
            }
        }

        let mut state = self.state.lock().expect("lock");
        state.last_report_day = Some(today);
        info!(?closing_day, ?today, "date rollover complete");
        Ok(())
    }

    pub fn add_per_uid_listener(
        &self,
        uid: i32,
        handle: u64,
        listener: Arc<dyn OveruseListener>,
    ) -> Result<(), WatchdogError> {
        self.listeners
            .lock()
            .expect("lock")
            .add_per_uid(uid, handle, listener)
            .map_err(|e| WatchdogError::IllegalState(e.to_string()))
    }

    pub fn add_system_listener(
        &self,
        handle: u64,
        listener: Arc<dyn OveruseListener>,
    ) -> Result<(), WatchdogError> {
        self.listeners
            .lock()
            .expect("lock")
            .add_system(handle, listener)
            .map_err(|e| WatchdogError::IllegalState(e.to_string()))
    }

    pub fn remove_listener(&self, handle: u64) {
        self.listeners.lock().expect("lock").remove(handle);
    }
}
