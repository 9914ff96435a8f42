//! Daemon Liaison (C6).
//!
//! A reconnect-with-backoff wrapper around the opaque native-daemon RPC peer.
//! The wire protocol itself stays out of scope — `DaemonLink` is the
//! capability-interface boundary the rest of the crate programs against:
//! one trait/struct per external peer, a `thiserror` error enum, and a reconnect
//! loop shaped around a fixed health-check cadence.

use crate::types::{OveruseAction, OveruseConfiguration, PackageRecord, ResourceOveruseFlags};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DaemonLinkError {
    #[error("daemon is disconnected")]
    Disconnected,
    #[error("payload exceeds transport limit")]
    TransportTooLarge,
    #[error("daemon returned an error: {0}")]
    Remote(String),
    #[error("a configuration push is already pending")]
    PendingAlready,
    #[error("timed out waiting for daemon connection")]
    Timeout,
}

/// Outbound daemon RPC surface.
///
/// The actual transport is out of scope; implementors own the socket/binder
/// details. Tests use an in-memory fake.
#[async_trait]
pub trait DaemonTransport: Send + Sync {
    async fn register_car_watchdog_service(&self) -> Result<(), DaemonLinkError>;
    async fn unregister_car_watchdog_service(&self) -> Result<(), DaemonLinkError>;
    async fn notify_system_state_change(
        &self,
        change: crate::types::SystemStateChange,
    ) -> Result<(), DaemonLinkError>;
    async fn tell_car_watchdog_service_alive(
        &self,
        pids_not_responding: Vec<i32>,
        session_id: u32,
    ) -> Result<(), DaemonLinkError>;
    async fn action_taken_on_resource_overuse(
        &self,
        actions: Vec<OveruseAction>,
    ) -> Result<(), DaemonLinkError>;
    async fn update_resource_overuse_configurations(
        &self,
        configs: Vec<OveruseConfiguration>,
    ) -> Result<(), DaemonLinkError>;
    async fn get_resource_overuse_configurations(
        &self,
        flags: ResourceOveruseFlags,
    ) -> Result<Vec<OveruseConfiguration>, DaemonLinkError>;
    async fn get_package_infos_for_uids(
        &self,
        uids: Vec<i32>,
        vendor_prefixes: Vec<String>,
    ) -> Result<Vec<(i32, PackageRecord)>, DaemonLinkError>;
}

#[async_trait]
impl DaemonTransport for Box<dyn DaemonTransport> {
    async fn register_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        (**self).register_car_watchdog_service().await
    }
    async fn unregister_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        (**self).unregister_car_watchdog_service().await
    }
    async fn notify_system_state_change(
        &self,
        change: crate::types::SystemStateChange,
    ) -> Result<(), DaemonLinkError> {
        (**self).notify_system_state_change(change).await
    }
    async fn tell_car_watchdog_service_alive(
        &self,
        pids_not_responding: Vec<i32>,
        session_id: u32,
    ) -> Result<(), DaemonLinkError> {
        (**self)
            .tell_car_watchdog_service_alive(pids_not_responding, session_id)
            .await
    }
    async fn action_taken_on_resource_overuse(
        &self,
        actions: Vec<OveruseAction>,
    ) -> Result<(), DaemonLinkError> {
        (**self).action_taken_on_resource_overuse(actions).await
    }
    async fn update_resource_overuse_configurations(
        &self,
        configs: Vec<OveruseConfiguration>,
    ) -> Result<(), DaemonLinkError> {
        (**self).update_resource_overuse_configurations(configs).await
    }
    async fn get_resource_overuse_configurations(
        &self,
        flags: ResourceOveruseFlags,
    ) -> Result<Vec<OveruseConfiguration>, DaemonLinkError> {
        (**self).get_resource_overuse_configurations(flags).await
    }
    async fn get_package_infos_for_uids(
        &self,
        uids: Vec<i32>,
        vendor_prefixes: Vec<String>,
    ) -> Result<Vec<(i32, PackageRecord)>, DaemonLinkError> {
        (**self).get_package_infos_for_uids(uids, vendor_prefixes).await
    }
}

/// C6: the daemon liaison. Owns the transport, connection state, immediate
/// retry budget, and the single pending-configuration slot.
pub struct DaemonLink<T: DaemonTransport> {
    transport: T,
    connected: AtomicBool,
    immediate_retries_left: AtomicU32,
    pending_config: Mutex<Option<(Vec<OveruseConfiguration>, ResourceOveruseFlags)>>,
    reconnect_interval: Duration,
    max_immediate_retries: u32,
}

impl<T: DaemonTransport> DaemonLink<T> {
    pub fn new(transport: T, reconnect_interval: Duration, max_immediate_retries: u32) -> Self {
        Self {
            transport,
            connected: AtomicBool::new(false),
            immediate_retries_left: AtomicU32::new(max_immediate_retries),
            pending_config: Mutex::new(None),
            reconnect_interval,
            max_immediate_retries,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect, register, and push the full user-state snapshot. Called at
    /// startup and from the reconnect loop.
    pub async fn connect(&self) -> Result<(), DaemonLinkError> {
        self.transport.register_car_watchdog_service().await?;
        self.connected.store(true, Ordering::Release);
        self.immediate_retries_left
            .store(self.max_immediate_retries, Ordering::Release);
        info!("daemon link connected");

        if let Some((configs, flags)) = self.pending_config.lock().await.take() {
            match self
                .transport
                .update_resource_overuse_configurations(configs.clone())
                .await
            {
                Ok(()) => info!("flushed pending configuration push on reconnect"),
                Err(e) => {
                    warn!(error = %e, "failed to flush pending configuration on reconnect");
                    *self.pending_config.lock().await = Some((configs, flags));
                }
            }
        }
        Ok(())
    }

    /// Mark the link down and run the reconnect loop: `max_immediate_retries`
    /// back-to-back attempts, then retry on the fixed interval indefinitely.
    /// Returns once reconnected.
    pub async fn handle_disconnect_and_reconnect(&self) {
        self.connected.store(false, Ordering::Release);
        warn!("daemon link disconnected, reconnecting");

        loop {
            let immediate = self.immediate_retries_left.load(Ordering::Acquire);
            if immediate > 0 {
                self.immediate_retries_left
                    .store(immediate - 1, Ordering::Release);
            } else {
                sleep(self.reconnect_interval).await;
            }

            match self.connect().await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "reconnect attempt failed"),
            }
        }
    }

    pub async fn notify_system_state_change(
        &self,
        change: crate::types::SystemStateChange,
    ) -> Result<(), DaemonLinkError> {
        if !self.is_connected() {
            return Err(DaemonLinkError::Disconnected);
        }
        self.transport.notify_system_state_change(change).await
    }

    pub async fn tell_car_watchdog_service_alive(
        &self,
        pids_not_responding: Vec<i32>,
        session_id: u32,
    ) -> Result<(), DaemonLinkError> {
        if !self.is_connected() {
            return Err(DaemonLinkError::Disconnected);
        }
        self.transport
            .tell_car_watchdog_service_alive(pids_not_responding, session_id)
            .await
    }

    /// Best-effort drain of the action queue; failures are logged, never
    /// propagated.
    pub async fn action_taken_on_resource_overuse(&self, actions: Vec<OveruseAction>) {
        if actions.is_empty() {
            return;
        }
        if !self.is_connected() {
            warn!(count = actions.len(), "dropping action report, daemon disconnected");
            return;
        }
        if let Err(e) = self.transport.action_taken_on_resource_overuse(actions).await {
            warn!(error = %e, "failed to report actions to daemon");
        }
    }

    /// `setResourceOveruseConfigurations`: stash-and-succeed when down;
    /// propagate transport-too-large; demote other remote errors to
    /// pending-retry.
    pub async fn set_resource_overuse_configurations(
        &self,
        configs: Vec<OveruseConfiguration>,
        flags: ResourceOveruseFlags,
    ) -> Result<(), DaemonLinkError> {
        let mut pending = self.pending_config.lock().await;
        if !self.is_connected() {
            if pending.is_some() {
                return Err(DaemonLinkError::PendingAlready);
            }
            *pending = Some((configs, flags));
            return Ok(());
        }
        drop(pending);

        match self
            .transport
            .update_resource_overuse_configurations(configs.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(DaemonLinkError::TransportTooLarge) => Err(DaemonLinkError::TransportTooLarge),
            Err(e) => {
                warn!(error = %e, "configuration push failed, stashing as pending");
                let mut pending = self.pending_config.lock().await;
                if pending.is_some() {
                    return Err(DaemonLinkError::PendingAlready);
                }
                *pending = Some((configs, flags));
                Ok(())
            }
        }
    }

    pub async fn get_resource_overuse_configurations(
        &self,
        flags: ResourceOveruseFlags,
    ) -> Result<Vec<OveruseConfiguration>, DaemonLinkError> {
        if !self.is_connected() {
            return Err(DaemonLinkError::Disconnected);
        }
        self.transport.get_resource_overuse_configurations(flags).await
    }

    pub async fn get_package_infos_for_uids(
        &self,
        uids: Vec<i32>,
        vendor_prefixes: Vec<String>,
    ) -> Result<Vec<(i32, PackageRecord)>, DaemonLinkError> {
        if !self.is_connected() {
            return Err(DaemonLinkError::Disconnected);
        }
        self.transport
            .get_package_infos_for_uids(uids, vendor_prefixes)
            .await
    }
}

pub type SharedDaemonLink<T> = Arc<DaemonLink<T>>;
