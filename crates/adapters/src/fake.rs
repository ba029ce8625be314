// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A scriptable [`ProcessAdapter`] for `substrate-engine`'s tests — no
//! real process is spawned. Enabled by the `test-support` feature so
//! other crates in the workspace can depend on it for their own tests.

use crate::worker::{ProcessAdapter, SpawnSpec, StopRequest, WorkerHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use substrate_core::{SpawnError, StderrTail};
use tokio::sync::{mpsc, watch};

/// What a [`FakeProcessAdapter::start`] call should do.
#[derive(Clone)]
pub enum FakeOutcome {
    /// Spawn succeeds; a real socket is bound immediately so a Prober
    /// connect succeeds, and the fake worker stays live until `stop`'d.
    Ready,
    /// Spawn succeeds but the process never binds its socket and never
    /// exits on its own.
    NeverReady,
    /// Spawn succeeds, then the process exits with `exit_code` after
    /// `after` elapses, before ever binding its socket.
    CrashBeforeReady { exit_code: i32, after: Duration },
    /// `start` itself fails.
    SpawnFails(SpawnError),
}

pub struct FakeProcessAdapter {
    outcome: Mutex<FakeOutcome>,
    spawn_count: Arc<AtomicU32>,
}

impl FakeProcessAdapter {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self { outcome: Mutex::new(outcome), spawn_count: Arc::new(AtomicU32::new(0)) }
    }

    pub fn set_outcome(&self, outcome: FakeOutcome) {
        *self.outcome.lock() = outcome;
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn start(&self, spec: SpawnSpec) -> Result<WorkerHandle, SpawnError> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().clone();

        if let FakeOutcome::SpawnFails(err) = outcome {
            return Err(clone_spawn_error(&err));
        }

        if matches!(outcome, FakeOutcome::Ready) {
            // The Prober dials `socket_path`; bind it for real so a
            // connect succeeds without spawning any process.
            let _ = std::fs::remove_file(&spec.socket_path);
            let listener = std::os::unix::net::UnixListener::bind(&spec.socket_path)
                .map_err(|e| SpawnError::Io(e.to_string()))?;
            // Leak the listener's fd for the fake handle's lifetime; it
            // is cleaned up when the socket file is unlinked on stop.
            std::mem::forget(listener);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = mpsc::channel::<StopRequest>(1);
        let pid = self.spawn_count() + 10_000;
        let socket_path = spec.socket_path.clone();

        tokio::spawn(async move {
            match outcome {
                FakeOutcome::Ready | FakeOutcome::NeverReady | FakeOutcome::SpawnFails(_) => {
                    if let Some(req) = stop_rx.recv().await {
                        let _ = exit_tx.send(Some(0));
                        let _ = req.done.send(());
                    }
                }
                FakeOutcome::CrashBeforeReady { exit_code, after } => {
                    tokio::select! {
                        _ = tokio::time::sleep(after) => {
                            let _ = exit_tx.send(Some(exit_code));
                        }
                        Some(req) = stop_rx.recv() => {
                            let _ = exit_tx.send(Some(0));
                            let _ = req.done.send(());
                        }
                    }
                }
            }
        });

        Ok(WorkerHandle::from_parts(
            pid,
            socket_path,
            StderrTail::new(spec.stderr_tail_bytes),
            exit_rx,
            stop_tx,
        ))
    }
}

fn clone_spawn_error(err: &SpawnError) -> SpawnError {
    match err {
        SpawnError::BinaryNotFound(p) => SpawnError::BinaryNotFound(p.clone()),
        SpawnError::PermissionDenied(m) => SpawnError::PermissionDenied(m.clone()),
        SpawnError::PrivilegeDropFailed { uid, message } => {
            SpawnError::PrivilegeDropFailed { uid: *uid, message: message.clone() }
        }
        SpawnError::Io(m) => SpawnError::Io(m.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn spec(dir: &std::path::Path) -> SpawnSpec {
        SpawnSpec {
            script_key: substrate_core::ScriptKey::new(dir.join("a.js")),
            interpreter_path: PathBuf::from("/bin/sh"),
            socket_path: dir.join("w.sock"),
            env: Default::default(),
            drop_to: None,
            stderr_tail_bytes: 256,
        }
    }

    #[tokio::test]
    async fn ready_outcome_binds_a_connectable_socket() {
        let dir = tempdir().unwrap();
        let adapter = FakeProcessAdapter::new(FakeOutcome::Ready);
        let handle = adapter.start(spec(dir.path())).await.unwrap();
        assert!(handle.is_live());
        assert!(tokio::net::UnixStream::connect(&handle.socket_path).await.is_ok());
    }

    #[tokio::test]
    async fn crash_before_ready_resolves_exited_with_the_configured_code() {
        let dir = tempdir().unwrap();
        let adapter = FakeProcessAdapter::new(FakeOutcome::CrashBeforeReady {
            exit_code: 3,
            after: Duration::from_millis(5),
        });
        let handle = adapter.start(spec(dir.path())).await.unwrap();
        assert_eq!(handle.exited().await, 3);
    }

    #[tokio::test]
    async fn spawn_fails_outcome_returns_the_configured_error() {
        let dir = tempdir().unwrap();
        let adapter = FakeProcessAdapter::new(FakeOutcome::SpawnFails(SpawnError::BinaryNotFound(
            PathBuf::from("/nope"),
        )));
        let err = adapter.start(spec(dir.path())).await.unwrap_err();
        assert!(matches!(err, SpawnError::BinaryNotFound(_)));
    }
}
