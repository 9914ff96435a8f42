//! `WatchdogContext`: global mutable state replaced with a single value
//! threaded through components.
//!
//! Owns C1-C6 and hands out a [`ServiceHandle`] in place of the weak
//! back-reference a callback object would otherwise hold to a
//! host-lifecycle-coupled service — callback objects instead carry an
//! explicit `ServiceHandle` value that becomes invalid once the service
//! stops. One struct bundling every subsystem, constructed once in
//! `main.rs` and handed to every task/handler.

use crate::classifier::PackageInfoProvider;
use crate::collaborators::PackageEnableStateController;
use crate::config::WatchdogConfig;
use crate::daemon_link::{DaemonLink, DaemonTransport};
use crate::error::WatchdogError;
use crate::health::HealthCheckScheduler;
use crate::overuse::{OveruseEngine, RecurringOveruseCheck, ThresholdRecurringOveruseCheck};
use crate::store::StatsStore;
use crate::threshold_cache::ThresholdConfigurationCache;
use crate::types::{ComponentType, ResourceOveruseStats, Tier};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type ErasedOveruseEngine = OveruseEngine<
    Box<dyn PackageInfoProvider>,
    Box<dyn PackageEnableStateController>,
    Box<dyn RecurringOveruseCheck>,
>;
type ErasedDaemonLink = DaemonLink<Box<dyn DaemonTransport>>;

/// Opaque handle to a `WatchdogContext`, invalidated once the context is
/// stopped. Stands in for a weak service back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHandle {
    generation: u64,
}

/// Serializable introspection snapshot: a minimal debug/logging dump, not a
/// full textual/proto dumper.
#[derive(Debug, Serialize)]
pub struct WatchdogStateSnapshot {
    pub running: bool,
    pub daemon_connected: bool,
    pub configured_component_types: Vec<ComponentType>,
    pub client_counts: Vec<(String, usize)>,
    pub tracked_packages: Vec<ResourceOveruseStats>,
}

/// The threaded context value owning every component.
pub struct WatchdogContext {
    pub config: WatchdogConfig,
    pub threshold_cache: Arc<ThresholdConfigurationCache>,
    pub store: Arc<StatsStore>,
    pub overuse: Arc<ErasedOveruseEngine>,
    pub health: Arc<HealthCheckScheduler>,
    pub daemon: Arc<ErasedDaemonLink>,
    generation: AtomicU64,
    running: AtomicBool,
}

impl WatchdogContext {
    /// Construct every component and replay C3's on-disk state into C4.
    /// `today` is passed in rather than read from a wall-clock API so
    /// callers (and tests) control it.
    pub fn new(
        config: WatchdogConfig,
        package_info: Box<dyn PackageInfoProvider>,
        enable_state: Box<dyn PackageEnableStateController>,
        transport: Box<dyn DaemonTransport>,
        today: chrono::NaiveDate,
    ) -> Result<Self, WatchdogError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| WatchdogError::Internal(format!("failed to create data dir: {e}")))?;

        let threshold_cache = Arc::new(ThresholdConfigurationCache::new());
        let store = Arc::new(StatsStore::open(&config.db_path())?);

        let recurring_check: Box<dyn RecurringOveruseCheck> =
            Box::new(ThresholdRecurringOveruseCheck {
                min_overuses: config.recurring_min_overuses,
                window_days: config.recurring_window_days,
            });

        let overuse = Arc::new(OveruseEngine::new(
            package_info,
            threshold_cache.clone(),
            store.clone(),
            enable_state,
            recurring_check,
            config.retention_days,
        ));
        overuse.load_from_store(today)?;

        let health = Arc::new(HealthCheckScheduler::new());
        let daemon = Arc::new(DaemonLink::new(
            transport,
            config.daemon_reconnect_interval,
            config.daemon_max_immediate_retries,
        ));

        Ok(Self {
            config,
            threshold_cache,
            store,
            overuse,
            health,
            daemon,
            generation: AtomicU64::new(0),
            running: AtomicBool::new(true),
        })
    }

    /// A handle valid until the next `stop()`.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Whether `handle` was issued by the context's current generation.
    pub fn is_valid(&self, handle: ServiceHandle) -> bool {
        self.running.load(Ordering::Acquire)
            && handle.generation == self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every previously issued `ServiceHandle` and mark the
    /// context stopped. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn dump_state(&self) -> WatchdogStateSnapshot {
        WatchdogStateSnapshot {
            running: self.is_running(),
            daemon_connected: self.daemon.is_connected(),
            configured_component_types: self.threshold_cache.configured_component_types(),
            client_counts: Tier::ALL
                .iter()
                .map(|tier| (format!("{tier:?}"), self.health.client_count(*tier)))
                .collect(),
            tracked_packages: self.overuse.all_stats(),
        }
    }
}
