//! Shared data-model types.
//!
//! `KillableState`, `ComponentType`, `ApplicationCategory`,
//! `OveruseActionKind`, and the daemon inbound message set are tagged
//! unions rather than integer constants.

mod client;
mod configuration;
mod daemon;
mod package;
mod usage;

pub use client::{CallbackHandle, ClientRegistration, Tier};
pub use configuration::{
    IoOveruseAlertThreshold, OveruseConfiguration, ResourceOveruseFlags,
};
pub use daemon::{
    DaemonInboundEvent, OveruseAction, OveruseActionKind, PackageIoOveruseStats,
    SystemStateChange,
};
pub use package::{
    ApplicationCategory, ComponentType, DefaultNotKillableSet, KillableState, PackageFlags,
    PackageRecord, PerStateBytes, UserPackageKey,
};
pub use usage::{DailyIoUsage, EnabledState, IoOveruseStats, PackageResourceUsage, ResourceOveruseStats};
