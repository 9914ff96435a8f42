//! Scenario coverage for the daemon liaison (C6): connect, disconnect,
//! reconnect-with-backoff, and the pending-configuration stash/flush cycle.

use async_trait::async_trait;
use io_watchdog::daemon_link::{DaemonLink, DaemonLinkError, DaemonTransport};
use io_watchdog::types::{
    OveruseAction, OveruseConfiguration, PackageRecord, ResourceOveruseFlags, SystemStateChange,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FlakyTransport {
    connect_failures_remaining: AtomicUsize,
    registrations: AtomicUsize,
    config_pushes: Mutex<Vec<Vec<OveruseConfiguration>>>,
}

impl FlakyTransport {
    fn failing(n: usize) -> Self {
        Self {
            connect_failures_remaining: AtomicUsize::new(n),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DaemonTransport for FlakyTransport {
    async fn register_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        let remaining = self.connect_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(DaemonLinkError::Remote("connection refused".to_string()));
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
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
        _pids: Vec<i32>,
        _session_id: u32,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn action_taken_on_resource_overuse(
        &self,
        _actions: Vec<OveruseAction>,
    ) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn update_resource_overuse_configurations(
        &self,
        configs: Vec<OveruseConfiguration>,
    ) -> Result<(), DaemonLinkError> {
        self.config_pushes.lock().unwrap().push(configs);
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

#[tokio::test]
async fn connect_succeeds_when_transport_is_healthy() {
    let link = DaemonLink::new(FlakyTransport::failing(0), Duration::from_millis(5), 3);
    assert!(!link.is_connected());
    link.connect().await.unwrap();
    assert!(link.is_connected());
}

#[tokio::test]
async fn reconnect_loop_recovers_after_transient_failures_within_immediate_budget() {
    let link = DaemonLink::new(FlakyTransport::failing(2), Duration::from_millis(5), 3);
    link.handle_disconnect_and_reconnect().await;
    assert!(link.is_connected());
}

#[tokio::test]
async fn reconnect_loop_falls_back_to_interval_retries_past_immediate_budget() {
    let link = DaemonLink::new(FlakyTransport::failing(5), Duration::from_millis(5), 2);
    link.handle_disconnect_and_reconnect().await;
    assert!(link.is_connected());
}

#[tokio::test]
async fn configuration_push_while_disconnected_stashes_and_flushes_on_reconnect() {
    let transport = FlakyTransport::failing(0);
    let link = DaemonLink::new(transport, Duration::from_millis(5), 3);

    let cfg = vec![OveruseConfiguration::new(
        io_watchdog::types::ComponentType::ThirdParty,
        io_watchdog::types::PerStateBytes::new(1, 1, 1),
    )];
    link.set_resource_overuse_configurations(cfg.clone(), ResourceOveruseFlags::IO)
        .await
        .unwrap();

    link.connect().await.unwrap();

    let second = link
        .set_resource_overuse_configurations(cfg, ResourceOveruseFlags::IO)
        .await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn outbound_calls_fail_fast_while_disconnected() {
    let link = DaemonLink::new(FlakyTransport::failing(0), Duration::from_millis(5), 3);
    let result = link
        .tell_car_watchdog_service_alive(vec![123], 1)
        .await;
    assert!(matches!(result, Err(DaemonLinkError::Disconnected)));
}

#[tokio::test]
async fn action_drain_is_silently_dropped_while_disconnected() {
    let link = DaemonLink::new(FlakyTransport::failing(0), Duration::from_millis(5), 3);
    link.action_taken_on_resource_overuse(vec![OveruseAction {
        uid: 1,
        generic_package_name: "com.example.app".to_string(),
        member_packages: vec!["com.example.app".to_string()],
        kind: io_watchdog::types::OveruseActionKind::Killed,
    }])
    .await;
}
