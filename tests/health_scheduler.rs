//! Scenario coverage for the health-check scheduler (C5) spanning
//! registration, ping/response rounds, and power-cycle/user-lifecycle
//! resets.

use io_watchdog::health::{HealthCheckError, HealthCheckScheduler};
use io_watchdog::types::{CallbackHandle, Tier};

fn handle(id: u64) -> CallbackHandle {
    CallbackHandle(id)
}

#[test]
fn duplicate_registration_is_rejected() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Critical).unwrap();
    let err = scheduler
        .register_client(handle(1), 100, 0, Tier::Critical)
        .unwrap_err();
    assert!(matches!(err, HealthCheckError::DuplicateRegistration));
}

#[test]
fn unregister_unknown_handle_is_a_silent_no_op() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.unregister_client(handle(404));
    assert_eq!(scheduler.client_count(Tier::Critical), 0);
}

#[test]
fn unacknowledged_client_is_reported_non_responding_next_round() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Critical).unwrap();

    let first = scheduler.run_round(Tier::Critical);
    assert!(first.is_empty(), "nothing pinged yet on the first round");

    let second = scheduler.run_round(Tier::Critical);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].handle, handle(1));
}

#[test]
fn acknowledged_client_is_not_reported_and_stays_registered() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Critical).unwrap();

    // First round assigns session id 1 to the lone client (the generator
    // is fresh for this scheduler instance).
    scheduler.run_round(Tier::Critical);
    assert!(scheduler.tell_client_alive(handle(1), 1));

    let not_responding = scheduler.run_round(Tier::Critical);
    assert!(not_responding.is_empty());
    assert_eq!(scheduler.client_count(Tier::Critical), 1);
}

#[test]
fn tell_client_alive_rejects_mismatched_handle_for_session() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Critical).unwrap();
    scheduler.run_round(Tier::Critical);

    assert!(!scheduler.tell_client_alive(handle(2), 1));
    assert!(!scheduler.tell_client_alive(handle(1), 999));
}

#[test]
fn unregister_removes_client_before_next_round_ping() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Critical).unwrap();
    scheduler.unregister_client(handle(1));

    scheduler.run_round(Tier::Critical);
    let not_responding = scheduler.run_round(Tier::Critical);
    assert!(not_responding.is_empty());
    assert_eq!(scheduler.client_count(Tier::Critical), 0);
}

#[test]
fn stopped_user_clients_are_excluded_from_non_responders() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 7, Tier::Critical).unwrap();
    scheduler.run_round(Tier::Critical);

    scheduler.on_user_state_stopped(7);
    let not_responding = scheduler.run_round(Tier::Critical);
    assert!(not_responding.is_empty());

    scheduler.on_user_state_started(7);
    let not_responding = scheduler.run_round(Tier::Critical);
    assert!(!not_responding.is_empty());
}

#[test]
fn power_cycle_resume_clears_in_flight_pings() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Moderate).unwrap();
    scheduler.run_round(Tier::Moderate);

    scheduler.on_power_cycle_resume();
    let not_responding = scheduler.run_round(Tier::Moderate);
    assert!(not_responding.is_empty());
}

#[test]
fn tiers_track_registrations_independently() {
    let scheduler = HealthCheckScheduler::new();
    scheduler.register_client(handle(1), 100, 0, Tier::Moderate).unwrap();
    scheduler.register_client(handle(2), 200, 0, Tier::Normal).unwrap();
    assert_eq!(scheduler.client_count(Tier::Moderate), 1);
    assert_eq!(scheduler.client_count(Tier::Normal), 1);
    assert_eq!(scheduler.client_count(Tier::Critical), 0);
}
