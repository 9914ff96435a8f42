//! End-to-end ingestion scenarios for the overuse accounting engine (C4)
//! wired to a real in-memory store, a static package classifier, and an
//! in-memory enable-state controller — covering the action-decision table
//! across forgive/notify/kill outcomes.

use io_watchdog::classifier::StaticPackageInfoProvider;
use io_watchdog::collaborators::InMemoryEnableStateController;
use io_watchdog::overuse::recurring::ThresholdRecurringOveruseCheck;
use io_watchdog::overuse::OveruseEngine;
use io_watchdog::store::StatsStore;
use io_watchdog::threshold_cache::ThresholdConfigurationCache;
use io_watchdog::types::{
    ComponentType, KillableState, OveruseActionKind, OveruseConfiguration, PackageFlags,
    PackageIoOveruseStats, PackageRecord, PerStateBytes, UserPackageKey,
};
use std::sync::Arc;

const UID: i32 = 10100;
const USER_ID: i32 = 0;
const PKG: &str = "com.example.app";

fn provider() -> StaticPackageInfoProvider {
    let mut p = StaticPackageInfoProvider::new();
    p.insert(
        UID,
        PackageRecord {
            generic_package_name: PKG.to_string(),
            members: vec![PackageFlags::third_party(PKG)],
        },
    );
    p
}

fn engine() -> OveruseEngine<StaticPackageInfoProvider, InMemoryEnableStateController, ThresholdRecurringOveruseCheck> {
    let threshold_cache = Arc::new(ThresholdConfigurationCache::new());
    threshold_cache.set(vec![OveruseConfiguration::new(
        ComponentType::ThirdParty,
        PerStateBytes::new(1_000, 1_000, 1_000),
    )]);
    let store = Arc::new(StatsStore::open_in_memory().unwrap());
    OveruseEngine::new(
        provider(),
        threshold_cache,
        store,
        InMemoryEnableStateController::new(),
        ThresholdRecurringOveruseCheck::default(),
        30,
    )
}

/// `exhausted` mirrors what the daemon itself would compute (remaining
/// budget hits zero in some state) — `ingest_stats` trusts this field
/// rather than re-deriving it from the configured threshold.
fn push(written: u64, exhausted: bool, killable_on_overuse: bool) -> PackageIoOveruseStats {
    PackageIoOveruseStats {
        uid: UID,
        should_notify: true,
        killable_on_overuse,
        written_bytes: PerStateBytes::new(written, 0, 0),
        remaining_write_bytes: if exhausted {
            PerStateBytes::ZERO
        } else {
            PerStateBytes::new(500, 500, 500)
        },
        total_overuses: 0,
        start_time: 0,
        duration_in_seconds: 3600,
    }
}

#[test]
fn under_threshold_push_is_tracked_without_action() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(500, false, true)], today).unwrap();

    let key = UserPackageKey::new(USER_ID, PKG);
    let stats = engine.snapshot_stats(&key).expect("usage tracked");
    assert_eq!(stats.io_overuse_stats.written_bytes.foreground_bytes, 500);
    assert!(engine.drain_pending_actions().is_empty());
}

#[test]
fn overuse_queues_killed_action_when_safe_to_kill() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(1_500, true, true)], today).unwrap();

    let actions = engine.drain_pending_actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].generic_package_name, PKG);
    assert_eq!(actions[0].kind, OveruseActionKind::Killed);

    let key = UserPackageKey::new(USER_ID, PKG);
    let stats = engine.snapshot_stats(&key).unwrap();
    assert!(stats.io_overuse_stats.total_overuses >= 1);
}

#[test]
fn overuse_with_killable_on_overuse_false_is_never_killed() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(1_500, true, false)], today).unwrap();

    let actions = engine.drain_pending_actions();
    assert_eq!(actions.len(), 1);
    assert_ne!(actions[0].kind, OveruseActionKind::Killed);

    let key = UserPackageKey::new(USER_ID, PKG);
    let stats = engine.snapshot_stats(&key).unwrap();
    assert_eq!(stats.io_overuse_stats.killable_on_overuse, false);
}

#[test]
fn user_opt_out_of_kill_is_respected_on_next_overuse() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(200, false, true)], today).unwrap();
    engine.drain_pending_actions();

    engine
        .set_killable_package_as_user(PKG, USER_ID, false)
        .unwrap();

    engine.ingest_stats(vec![push(1_500, true, true)], today).unwrap();
    let actions = engine.drain_pending_actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, OveruseActionKind::NotKilledUserOpted);
}

#[test]
fn reset_resource_overuse_stats_clears_named_package_only() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(700, false, true)], today).unwrap();

    engine
        .reset_resource_overuse_stats(&[PKG.to_string()])
        .unwrap();

    let key = UserPackageKey::new(USER_ID, PKG);
    let stats = engine.snapshot_stats(&key).unwrap();
    assert_eq!(stats.io_overuse_stats.written_bytes.foreground_bytes, 0);
}

#[test]
fn unmapped_uid_is_dropped_without_error() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();

    let mut stats = push(1_500, true, true);
    stats.uid = 99_999;
    assert!(engine.ingest_stats(vec![stats], today).is_ok());
    assert!(engine.all_stats().is_empty());
}

#[test]
fn get_package_killable_states_as_user_reflects_current_safe_to_kill() {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let engine = engine();
    engine.load_from_store(today).unwrap();
    engine.ingest_stats(vec![push(100, false, true)], today).unwrap();

    let states = engine.get_package_killable_states_as_user(USER_ID);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0.generic_package_name, PKG);
    assert_eq!(states[0].1, KillableState::Yes);
}
