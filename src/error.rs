//! Crate-wide error kinds.
//!
//! Each subsystem defines its own `thiserror` enum, one per subsystem,
//! converted at the boundary; [`WatchdogError`] is the public API-surface
//! error that every subsystem error converts into.

use thiserror::Error;

/// Public API-surface error. Every subsystem error converts into one of
/// these four kinds.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// Null inputs, zero/unknown flags, unknown tier, unknown componentType,
    /// duplicate componentType in a config batch, unknown package in
    /// `setKillablePackageAsUser`, or an attempt to change a `Never`-state
    /// package.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Daemon disconnected for a get-config call, or a pending set-config
    /// request is already in progress.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Transport-too-large on set-config; propagated to the caller
    /// unchanged. Other remote errors are demoted to pending-retry and
    /// yield success instead of this variant.
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal error swallowed everywhere except where explicitly
    /// surfaced (e.g. store I/O failures that still allow in-memory
    /// accounting to continue).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::store::StoreError> for WatchdogError {
    fn from(e: crate::store::StoreError) -> Self {
        WatchdogError::Internal(e.to_string())
    }
}

impl From<crate::classifier::ClassifierError> for WatchdogError {
    fn from(e: crate::classifier::ClassifierError) -> Self {
        match e {
            crate::classifier::ClassifierError::NotFound(_) => {
                WatchdogError::InvalidArgument(e.to_string())
            }
        }
    }
}

impl From<crate::health::HealthCheckError> for WatchdogError {
    fn from(e: crate::health::HealthCheckError) -> Self {
        WatchdogError::IllegalState(e.to_string())
    }
}

impl From<crate::overuse::ListenerError> for WatchdogError {
    fn from(e: crate::overuse::ListenerError) -> Self {
        WatchdogError::IllegalState(e.to_string())
    }
}

impl From<crate::overuse::OveruseError> for WatchdogError {
    fn from(e: crate::overuse::OveruseError) -> Self {
        match e {
            crate::overuse::OveruseError::Invalid(msg) => WatchdogError::InvalidArgument(msg),
        }
    }
}

impl From<crate::daemon_link::DaemonLinkError> for WatchdogError {
    fn from(e: crate::daemon_link::DaemonLinkError) -> Self {
        match e {
            crate::daemon_link::DaemonLinkError::Disconnected => {
                WatchdogError::IllegalState("daemon disconnected".to_string())
            }
            crate::daemon_link::DaemonLinkError::TransportTooLarge => {
                WatchdogError::Transport("payload exceeds transport limit".to_string())
            }
            crate::daemon_link::DaemonLinkError::Remote(msg) => WatchdogError::Internal(msg),
            crate::daemon_link::DaemonLinkError::PendingAlready => {
                WatchdogError::IllegalState("a configuration push is already pending".to_string())
            }
            crate::daemon_link::DaemonLinkError::Timeout => {
                WatchdogError::IllegalState("timed out waiting for daemon connection".to_string())
            }
        }
    }
}

pub type WatchdogResult<T> = Result<T, WatchdogError>;
