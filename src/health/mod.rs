//! Health-Check Scheduler (C5).
//!
//! Maintains three fixed-deadline tiers of registered in-process clients and
//! drives their ping/response cycles. Tier tables and the stopped-users set
//! move together under a single lock: one lock-guarded state struct polled
//! on a fixed interval per tier.

mod ping;
mod tier;

pub use ping::SessionIdGenerator;
pub use tier::TierState;

use crate::types::{CallbackHandle, ClientRegistration, Tier};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("handle already registered")]
    DuplicateRegistration,
}

struct Inner {
    tiers: HashMap<Tier, TierState>,
    stopped_users: HashSet<i32>,
}

/// C5: the health-check scheduler.
pub struct HealthCheckScheduler {
    inner: Mutex<Inner>,
    session_ids: SessionIdGenerator,
}

impl Default for HealthCheckScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheckScheduler {
    pub fn new() -> Self {
        let mut tiers = HashMap::new();
        for tier in Tier::ALL {
            tiers.insert(tier, TierState::default());
        }
        Self {
            inner: Mutex::new(Inner {
                tiers,
                stopped_users: HashSet::new(),
            }),
            session_ids: SessionIdGenerator::new(),
        }
    }

    /// Rejected for already-registered handles. Unknown-tier rejection is
    /// enforced by the type system — `Tier` is a closed enum.
    pub fn register_client(
        &self,
        handle: CallbackHandle,
        pid: i32,
        user_id: i32,
        tier: Tier,
    ) -> Result<(), HealthCheckError> {
        let mut inner = self.inner.lock().expect("lock");
        let state = inner.tiers.get_mut(&tier).expect("all tiers present");
        if state.clients.iter().any(|c| c.handle == handle) {
            return Err(HealthCheckError::DuplicateRegistration);
        }
        state.clients.push(ClientRegistration {
            handle,
            pid,
            user_id,
            tier,
            current_session_id: 0,
        });
        info!(pid, user_id, ?tier, "client registered");
        Ok(())
    }

    /// Silent no-op for unknown handles, matching the "liveness loss removes
    /// the entry silently" behavior used for both explicit unregister and
    /// callback death.
    pub fn unregister_client(&self, handle: CallbackHandle) {
        let mut inner = self.inner.lock().expect("lock");
        for state in inner.tiers.values_mut() {
            state.clients.retain(|c| c.handle != handle);
            state.pinged_clients.retain(|_, c| c.handle != handle);
        }
    }

    /// A client's response to an outstanding ping. Returns `true` if it
    /// matched a pinged session.
    pub fn tell_client_alive(&self, handle: CallbackHandle, session_id: u32) -> bool {
        let mut inner = self.inner.lock().expect("lock");
        for state in inner.tiers.values_mut() {
            if let Some(client) = state.pinged_clients.get(&session_id) {
                if client.handle == handle {
                    state.pinged_clients.remove(&session_id);
                    return true;
                }
            }
        }
        false
    }

    /// Run one round for `tier`: analyze the previous round's non-responders
    /// (Critical always; Moderate/Normal only when a round was in progress —
    /// each tier's round is driven by its own fixed-period timer rather than
    /// ad hoc daemon requests), then start a fresh round with new session
    /// ids. Returns the clients that failed to respond, for the caller to
    /// run `onPrepareProcessTermination` on before reporting to the daemon.
    pub fn run_round(&self, tier: Tier) -> Vec<ClientRegistration> {
        let mut inner = self.inner.lock().expect("lock");
        let stopped_users = inner.stopped_users.clone();
        let state = inner.tiers.get_mut(&tier).expect("all tiers present");

        let mut not_responding = Vec::new();
        if tier == Tier::Critical || state.check_in_progress {
            for (_, client) in state.pinged_clients.drain() {
                if !stopped_users.contains(&client.user_id) {
                    not_responding.push(client);
                }
            }
            state.check_in_progress = false;
        }

        state.pinged_clients.clear();
        for client in state.clients.iter_mut() {
            let session_id = self.session_ids.next();
            client.current_session_id = session_id;
            state.pinged_clients.insert(session_id, client.clone());
        }
        state.check_in_progress = true;

        if !not_responding.is_empty() {
            warn!(?tier, count = not_responding.len(), "clients not responding");
        }
        not_responding
    }

    /// `POWER_CYCLE_RESUME`: reset point, clears all pinged-clients tables.
    pub fn on_power_cycle_resume(&self) {
        let mut inner = self.inner.lock().expect("lock");
        for state in inner.tiers.values_mut() {
            state.pinged_clients.clear();
            state.check_in_progress = false;
        }
    }

    pub fn on_user_state_stopped(&self, user_id: i32) {
        self.inner.lock().expect("lock").stopped_users.insert(user_id);
    }

    pub fn on_user_state_started(&self, user_id: i32) {
        self.inner.lock().expect("lock").stopped_users.remove(&user_id);
    }

    pub fn client_count(&self, tier: Tier) -> usize {
        self.inner.lock().expect("lock").tiers[&tier].clients.len()
    }
}
