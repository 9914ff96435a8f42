//! `WatchdogService`'s daemon-inbound dispatch, wired through a real
//! `WatchdogContext` rather than a bare `OveruseEngine`.

use io_watchdog::classifier::StaticPackageInfoProvider;
use io_watchdog::collaborators::InMemoryEnableStateController;
use io_watchdog::config::WatchdogConfig;
use io_watchdog::context::WatchdogContext;
use io_watchdog::daemon_link::{DaemonLinkError, DaemonTransport};
use io_watchdog::service::WatchdogService;
use io_watchdog::types::{
    DaemonInboundEvent, OveruseConfiguration, PackageFlags, PackageIoOveruseStats, PackageRecord,
    PerStateBytes, ResourceOveruseFlags, SystemStateChange,
};

const UID: i32 = 10200;
const PKG: &str = "com.example.dispatch";

struct NoopTransport;

#[async_trait::async_trait]
impl DaemonTransport for NoopTransport {
    async fn register_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn unregister_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn notify_system_state_change(
        &self,
        _change: SystemStateChange,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn tell_car_watchdog_service_alive(
        &self,
        _pids_not_responding: Vec<i32>,
        _session_id: u32,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn action_taken_on_resource_overuse(
        &self,
        _actions: Vec<io_watchdog::types::OveruseAction>,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn update_resource_overuse_configurations(
        &self,
        _configs: Vec<OveruseConfiguration>,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn get_resource_overuse_configurations(
        &self,
        _flags: ResourceOveruseFlags,
    ) -> Result<Vec<OveruseConfiguration>, DaemonLinkError> {
        Ok(Vec::new())
    }
    async fn get_package_infos_for_uids(
        &self,
        _uids: Vec<i32>,
        _vendor_prefixes: Vec<String>,
    ) -> Result<Vec<(i32, PackageRecord)>, DaemonLinkError> {
        Ok(Vec::new())
    }
}

fn service(data_dir: &std::path::Path) -> WatchdogService {
    let mut provider = StaticPackageInfoProvider::new();
    provider.insert(
        UID,
        PackageRecord {
            generic_package_name: PKG.to_string(),
            members: vec![PackageFlags::third_party(PKG)],
        },
    );

    let config = WatchdogConfig {
        data_dir: data_dir.to_path_buf(),
        ..WatchdogConfig::from_env()
    };
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let context = WatchdogContext::new(
        config,
        Box::new(provider),
        Box::new(InMemoryEnableStateController::new()),
        Box::new(NoopTransport),
        today,
    )
    .unwrap();
    WatchdogService::new(std::sync::Arc::new(context))
}

fn push(written: u64, exhausted: bool) -> PackageIoOveruseStats {
    PackageIoOveruseStats {
        uid: UID,
        should_notify: true,
        killable_on_overuse: true,
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
fn latest_io_overuse_stats_event_reaches_the_overuse_engine() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

    let response = service
        .handle_daemon_event(
            DaemonInboundEvent::LatestIoOveruseStats {
                stats: vec![push(250, false)],
            },
            today,
        )
        .unwrap();
    assert!(response.is_none());

    let stats = service
        .get_resource_overuse_stats(UID, PKG, io_watchdog::service::StatsPeriod::Current)
        .unwrap()
        .expect("usage tracked");
    assert_eq!(stats.io_overuse_stats.written_bytes.foreground_bytes, 250);
}

#[test]
fn get_package_infos_for_uids_event_resolves_known_uid_and_drops_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

    let response = service
        .handle_daemon_event(
            DaemonInboundEvent::GetPackageInfosForUids {
                uids: vec![UID, 99_999],
                vendor_prefixes: Vec::new(),
            },
            today,
        )
        .unwrap()
        .expect("package infos response");

    assert_eq!(response.len(), 1);
    assert_eq!(response[0].0, UID);
    assert_eq!(response[0].1.generic_package_name, PKG);
}

#[test]
fn check_if_alive_and_prepare_process_termination_are_dispatch_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

    assert!(service
        .handle_daemon_event(
            DaemonInboundEvent::CheckIfAlive {
                session_id: 1,
                tier: io_watchdog::types::Tier::Critical,
            },
            today,
        )
        .unwrap()
        .is_none());

    assert!(service
        .handle_daemon_event(DaemonInboundEvent::PrepareProcessTermination, today)
        .unwrap()
        .is_none());
}
