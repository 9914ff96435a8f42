//! `io-watchdogd` — the automotive resource-overuse watchdog binary.
//!
//! Bootstraps a [`WatchdogContext`], then spawns the health-check timers,
//! the action-report drain loop, and the daemon reconnect loop onto a
//! `tokio` multi-thread runtime, all selecting on a shared
//! `CancellationToken` for graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use io_watchdog::classifier::StaticPackageInfoProvider;
use io_watchdog::collaborators::InMemoryEnableStateController;
use io_watchdog::config::WatchdogConfig;
use io_watchdog::context::WatchdogContext;
use io_watchdog::daemon_link::{DaemonLinkError, DaemonTransport};
use io_watchdog::service::WatchdogService;
use io_watchdog::types::{OveruseConfiguration, PackageRecord, ResourceOveruseFlags, SystemStateChange, Tier};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "io-watchdogd")]
#[command(about = "Automotive resource-overuse watchdog")]
#[command(version)]
struct CliArgs {
    /// Directory for the persistent stats store (overrides
    /// IO_WATCHDOG_DATA_DIR).
    #[arg(long, env = "IO_WATCHDOG_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Retention window, in days, for the persistent stats store.
    #[arg(long, default_value_t = 30)]
    retention_days: i64,

    /// Wipe the data directory before starting.
    #[arg(long)]
    reset_db: bool,
}

/// A daemon transport that never connects, for standalone bring-up without
/// the native daemon attached. Mirrors the liaison's always-retry contract
/// rather than panicking when no real daemon is wired in.
struct NullDaemonTransport;

#[async_trait::async_trait]
impl DaemonTransport for NullDaemonTransport {
    async fn register_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        Err(DaemonLinkError::Remote("no daemon transport configured".to_string()))
    }
    async fn unregister_car_watchdog_service(&self) -> Result<(), DaemonLinkError> {
        Ok(())
    }
    async fn notify_system_state_change(
        &self,
        _change: SystemStateChange,
    ) -> Result<(), DaemonLinkError> {
        Err(DaemonLinkError::Disconnected)
    }
    async fn tell_car_watchdog_service_alive(
        &self,
        _pids_not_responding: Vec<i32>,
        _session_id: u32,
    ) -> Result<(), DaemonLinkError> {
        Err(DaemonLinkError::Disconnected)
    }
    async fn action_taken_on_resource_overuse(
        &self,
        _actions: Vec<io_watchdog::types::OveruseAction>,
    ) -> Result<(), DaemonLinkError> {
        Err(DaemonLinkError::Disconnected)
    }
    async fn update_resource_overuse_configurations(
        &self,
        _configs: Vec<OveruseConfiguration>,
    ) -> Result<(), DaemonLinkError> {
        Err(DaemonLinkError::Disconnected)
    }
    async fn get_resource_overuse_configurations(
        &self,
        _flags: ResourceOveruseFlags,
    ) -> Result<Vec<OveruseConfiguration>, DaemonLinkError> {
        Err(DaemonLinkError::Disconnected)
    }
    async fn get_package_infos_for_uids(
        &self,
        _uids: Vec<i32>,
        _vendor_prefixes: Vec<String>,
    ) -> Result<Vec<(i32, PackageRecord)>, DaemonLinkError> {
        Ok(Vec::new())
    }
}

/// Runs one tier's ping/response cycle on its own fixed period until
/// cancelled.
async fn run_health_check_tier(
    service: Arc<WatchdogService>,
    tier: Tier,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(tier.deadline());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(?tier, "health-check tier shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let not_responding = service.context().health.run_round(tier);
                if !not_responding.is_empty() {
                    warn!(?tier, count = not_responding.len(), "reporting non-responders to daemon");
                    let pids = not_responding.iter().map(|c| c.pid).collect();
                    if let Err(e) = service
                        .context()
                        .daemon
                        .tell_car_watchdog_service_alive(pids, 0)
                        .await
                    {
                        warn!(error = %e, "failed to report non-responders");
                    }
                }
            }
        }
    }
}

/// Drains C4's pending action queue to the daemon on a short fixed period.
async fn run_action_drain(service: Arc<WatchdogService>, cancel: CancellationToken) -> Result<()> {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("action drain loop shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let actions = service.context().overuse.drain_pending_actions();
                service.context().daemon.action_taken_on_resource_overuse(actions).await;
            }
        }
    }
}

/// Connects (or reconnects indefinitely) to the daemon liaison.
async fn run_daemon_liaison(service: Arc<WatchdogService>, cancel: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("daemon liaison shutting down");
                return Ok(());
            }
            () = service.context().daemon.handle_disconnect_and_reconnect() => {}
        }
    }
}

/// Runs the daily retention shrink on a fixed period (idempotent per
/// calendar day).
async fn run_retention_shrink(service: Arc<WatchdogService>, cancel: CancellationToken) -> Result<()> {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                let today = chrono::Utc::now().date_naive();
                let retention_days = service.context().config.retention_days;
                if let Err(e) = service.context().store.shrink_database(today, retention_days) {
                    warn!(error = %e, "retention shrink failed");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = WatchdogConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.retention_days = args.retention_days;

    if args.reset_db && config.data_dir.exists() {
        warn!(dir = %config.data_dir.display(), "reset-db requested, wiping data directory");
        std::fs::remove_dir_all(&config.data_dir)
            .context("failed to remove existing data directory")?;
    }

    info!("io-watchdogd starting");

    let today = chrono::Utc::now().date_naive();
    let context = Arc::new(
        WatchdogContext::new(
            config,
            Box::new(StaticPackageInfoProvider::new()),
            Box::new(InMemoryEnableStateController::new()),
            Box::new(NullDaemonTransport),
            today,
        )
        .context("failed to initialize watchdog context")?,
    );
    let service = Arc::new(WatchdogService::new(context));

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_token.cancel();
    });

    let mut tasks = JoinSet::new();
    for tier in Tier::ALL {
        tasks.spawn(run_health_check_tier(service.clone(), tier, cancel_token.clone()));
    }
    tasks.spawn(run_action_drain(service.clone(), cancel_token.clone()));
    tasks.spawn(run_daemon_liaison(service.clone(), cancel_token.clone()));
    tasks.spawn(run_retention_shrink(service.clone(), cancel_token.clone()));

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result.context("watchdog task panicked")? {
            warn!(error = %e, "watchdog task returned an error");
        }
    }

    service.context().stop();
    info!("io-watchdogd shutdown complete");
    Ok(())
}
