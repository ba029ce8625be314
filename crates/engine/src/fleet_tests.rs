// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use std::time::Duration;
use substrate_adapters::{FakeOutcome, FakeProcessAdapter};
use substrate_core::{FakeClock, SpawnError};
use tempfile::tempdir;

fn config() -> ControllerConfig {
    ControllerConfig {
        idle_timeout: IdleTimeout::Never,
        startup_timeout: Duration::from_millis(200),
        reaper_period: Duration::from_secs(3600),
        stop_grace: Duration::from_millis(50),
        ..ControllerConfig::default()
    }
}

fn make_fleet(
    config: ControllerConfig,
    outcome: FakeOutcome,
    clock: Arc<FakeClock>,
) -> (Arc<Fleet<FakeProcessAdapter>>, PathBuf, Arc<FakeProcessAdapter>) {
    let dir = tempdir().unwrap();
    let script = dir.path().join("a.js");
    std::fs::write(&script, b"").unwrap();
    let adapter = Arc::new(FakeProcessAdapter::new(outcome));
    let fleet = Fleet::new(
        config,
        dir.path().to_path_buf(),
        PathBuf::from("/bin/sh"),
        Arc::clone(&adapter),
        clock,
    );
    // Keep the tempdir alive for the fleet's lifetime by leaking it;
    // tests only run for a few hundred milliseconds.
    std::mem::forget(dir);
    (fleet, script, adapter)
}

#[tokio::test]
async fn get_socket_starts_a_worker_and_returns_its_socket_path() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    let socket = fleet.get_socket(&script).await.unwrap();
    assert!(socket.to_string_lossy().contains("substrate-"));
    assert_eq!(adapter.spawn_count(), 1);
    fleet.shutdown().await;
}

#[tokio::test]
async fn second_call_reuses_the_running_worker() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    let first = fleet.get_socket(&script).await.unwrap();
    let second = fleet.get_socket(&script).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(adapter.spawn_count(), 1);
    fleet.shutdown().await;
}

#[tokio::test]
async fn concurrent_cold_starts_singleflight_into_one_spawn() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    let a = fleet.get_socket(&script);
    let b = fleet.get_socket(&script);
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(adapter.spawn_count(), 1);
    fleet.shutdown().await;
}

#[tokio::test]
async fn startup_timeout_surfaces_as_a_fleet_error_and_clears_the_record() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(config(), FakeOutcome::NeverReady, clock);

    let err = fleet.get_socket(&script).await.unwrap_err();
    assert!(matches!(err, FleetError::StartupTimeout(_)));
    assert_eq!(fleet.len(), 0);
    fleet.shutdown().await;
}

#[tokio::test]
async fn crash_before_ready_surfaces_as_crashed() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(
        config(),
        FakeOutcome::CrashBeforeReady { exit_code: 7, after: Duration::from_millis(5) },
        clock,
    );

    let err = fleet.get_socket(&script).await.unwrap_err();
    match err {
        FleetError::Crashed(c) => assert_eq!(c.exit_code, 7),
        other => panic!("expected Crashed, got {other:?}"),
    }
    assert_eq!(fleet.len(), 0);
    fleet.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_never_inserts_a_record() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(
        ControllerConfig { max_start_attempts: 1, ..config() },
        FakeOutcome::SpawnFails(SpawnError::BinaryNotFound(PathBuf::from("/nope"))),
        clock,
    );

    let err = fleet.get_socket(&script).await.unwrap_err();
    assert!(matches!(err, FleetError::Spawn(_)));
    assert_eq!(fleet.len(), 0);
    fleet.shutdown().await;
}

#[tokio::test]
async fn invalid_script_path_never_spawns_anything() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, _script, adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    let err = fleet.get_socket(Path::new("relative/path.js")).await.unwrap_err();
    assert!(matches!(err, FleetError::Path(_)));
    assert_eq!(adapter.spawn_count(), 0);
    fleet.shutdown().await;
}

#[tokio::test]
async fn idle_reaper_sweep_evicts_only_past_the_deadline() {
    let clock = Arc::new(FakeClock::new());
    let cfg = ControllerConfig { idle_timeout: IdleTimeout::After(Duration::from_secs(30)), ..config() };
    let (fleet, script, adapter) = make_fleet(cfg, FakeOutcome::Ready, Arc::clone(&clock));

    fleet.get_socket(&script).await.unwrap();
    fleet.run_reaper_sweep().await;
    assert_eq!(fleet.len(), 1, "not yet idle, must not be evicted");

    clock.advance(Duration::from_secs(31));
    fleet.run_reaper_sweep().await;
    assert_eq!(fleet.len(), 0, "past idle_timeout, must be evicted");

    fleet.get_socket(&script).await.unwrap();
    assert_eq!(adapter.spawn_count(), 2, "eviction must allow a fresh cold start");
    fleet.shutdown().await;
}

#[tokio::test]
async fn note_used_resets_the_idle_clock() {
    let clock = Arc::new(FakeClock::new());
    let cfg = ControllerConfig { idle_timeout: IdleTimeout::After(Duration::from_secs(30)), ..config() };
    let (fleet, script, _adapter) = make_fleet(cfg, FakeOutcome::Ready, Arc::clone(&clock));

    fleet.get_socket(&script).await.unwrap();
    clock.advance(Duration::from_secs(20));
    fleet.note_used(&script);
    clock.advance(Duration::from_secs(20));
    fleet.run_reaper_sweep().await;
    assert_eq!(fleet.len(), 1, "note_used must push the deadline forward");
    fleet.shutdown().await;
}

#[tokio::test]
async fn stop_and_remove_is_fire_and_forget_and_clears_the_record() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    fleet.get_socket(&script).await.unwrap();
    fleet.stop_and_remove(&script);
    for _ in 0..50 {
        if fleet.len() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fleet.len(), 0);
    fleet.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_every_live_worker() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    let socket = fleet.get_socket(&script).await.unwrap();
    fleet.shutdown().await;
    assert!(!socket.exists());
}

#[tokio::test]
async fn snapshot_reports_state_and_pid_for_live_workers() {
    let clock = Arc::new(FakeClock::new());
    let (fleet, script, _adapter) = make_fleet(config(), FakeOutcome::Ready, clock);

    fleet.get_socket(&script).await.unwrap();
    let snapshot = fleet.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, WorkerState::Ready);
    assert!(snapshot[0].pid.is_some());
    fleet.shutdown().await;
}
