//! Health-check client registration and tier definitions.

use std::time::Duration;

/// Opaque handle identifying a registered in-process client's death-notice
/// callback. Stands in for the platform binder callback object: equality
/// identifies the same registration, liveness is tracked by the caller
/// through [`crate::collaborators::LivenessMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub u64);

/// Health-check timeout tier. Each tier has a fixed ping deadline and is
/// scheduled independently by the health-check scheduler (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Critical,
    Moderate,
    Normal,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Critical, Tier::Moderate, Tier::Normal];

    /// Ping deadline for this tier (also its round period).
    pub fn deadline(self) -> Duration {
        match self {
            Tier::Critical => Duration::from_secs(3),
            Tier::Moderate => Duration::from_secs(5),
            Tier::Normal => Duration::from_secs(10),
        }
    }
}

/// A registered in-process client.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub handle: CallbackHandle,
    pub pid: i32,
    pub user_id: i32,
    pub tier: Tier,
    /// Session id assigned at the start of the client's current ping cycle.
    pub current_session_id: u32,
}
