//! External collaborators: capability-interface traits for platform services
//! this crate observes but never implements. Each external peer is modeled
//! as a trait boundary rather than a concrete client, so its internals stay
//! out of scope.

use crate::types::{CallbackHandle, EnabledState};

/// The platform package manager's per-package enable-state surface. Real
/// implementations forward to the OS; tests use [`InMemoryEnableStateController`].
pub trait PackageEnableStateController: Send + Sync {
    fn enabled_state(&self, package_name: &str, user_id: i32) -> EnabledState;
    fn set_enabled_state(&self, package_name: &str, user_id: i32, state: EnabledState);
}

impl PackageEnableStateController for Box<dyn PackageEnableStateController> {
    fn enabled_state(&self, package_name: &str, user_id: i32) -> EnabledState {
        (**self).enabled_state(package_name, user_id)
    }
    fn set_enabled_state(&self, package_name: &str, user_id: i32, state: EnabledState) {
        (**self).set_enabled_state(package_name, user_id, state);
    }
}

/// In-process liveness tracking for a registered callback. A registration
/// whose handle reports not-alive is removed silently, without notifying
/// the caller.
pub trait LivenessMonitor: Send + Sync {
    fn is_alive(&self, handle: CallbackHandle) -> bool;
}

/// User-lifecycle broadcaster (non-goal): forwards start/stop/removal events
/// into C4 and C5. Modeled only as a trait so `WatchdogContext` has a
/// well-typed place to dispatch `SystemStateChange::UserState*`.
pub trait UserLifecycleListener: Send + Sync {
    fn on_user_removed(&self, user_id: i32);
}

/// Power-state broadcaster (non-goal): forwards power-cycle transitions.
pub trait PowerStateListener: Send + Sync {
    fn on_power_cycle_resume(&self);
    fn on_power_cycle_suspend(&self);
}

/// Test/bring-up [`PackageEnableStateController`] backed by an in-memory map.
/// Unknown packages default to `Enabled`.
#[derive(Default)]
pub struct InMemoryEnableStateController {
    states: std::sync::Mutex<std::collections::HashMap<(String, i32), EnabledState>>,
}

impl InMemoryEnableStateController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PackageEnableStateController for InMemoryEnableStateController {
    fn enabled_state(&self, package_name: &str, user_id: i32) -> EnabledState {
        self.states
            .lock()
            .expect("lock")
            .get(&(package_name.to_string(), user_id))
            .copied()
            .unwrap_or(EnabledState::Enabled)
    }

    fn set_enabled_state(&self, package_name: &str, user_id: i32, state: EnabledState) {
        self.states
            .lock()
            .expect("lock")
            .insert((package_name.to_string(), user_id), state);
    }
}
