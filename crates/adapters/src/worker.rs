// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process creation, monitoring, and teardown (spec §4.4).
//!
//! Spawn logic follows the coop agent adapter's shape (command-line
//! assembly, workspace precondition, reaper task) but generalized: the
//! interpreter invocation is fixed (`interpreter script_path
//! socket_path`), the reaper is a full supervisor that also handles
//! `stop`'s SIGTERM/SIGKILL escalation, and a `watch`-backed exit code
//! replaces the coop adapter's one-shot `mpsc::Sender<Event>`.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use substrate_core::{ScriptKey, SpawnError, StderrTail};
use tokio::sync::{mpsc, watch};

use crate::ring_writer;

/// Everything `ProcessAdapter::start` needs to spawn one worker.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub script_key: ScriptKey,
    pub interpreter_path: PathBuf,
    pub socket_path: PathBuf,
    pub env: HashMap<String, String>,
    /// Resolved (uid, gid) to drop to, already computed by the caller
    /// from the script file's owner and the controller's effective uid
    /// (spec §4.4 "drop to the script file's owner uid/gid").
    pub drop_to: Option<(u32, u32)>,
    pub stderr_tail_bytes: usize,
}

/// A live, spawned worker process. The only state a Worker exposes
/// outside itself (spec §4.3 Ownership: "The Worker exclusively owns
/// its child handle and its stderr ring buffer").
pub struct WorkerHandle {
    pub pid: u32,
    pub socket_path: PathBuf,
    pub stderr_tail: StderrTail,
    exit_rx: watch::Receiver<Option<i32>>,
    stop_tx: mpsc::Sender<StopRequest>,
}

pub(crate) struct StopRequest {
    pub(crate) grace: Duration,
    pub(crate) done: tokio::sync::oneshot::Sender<()>,
}

impl WorkerHandle {
    /// Assemble a handle directly, bypassing a real spawn. Used by the
    /// `test-support` fake adapter.
    pub(crate) fn from_parts(
        pid: u32,
        socket_path: PathBuf,
        stderr_tail: StderrTail,
        exit_rx: watch::Receiver<Option<i32>>,
        stop_tx: mpsc::Sender<StopRequest>,
    ) -> Self {
        Self { pid, socket_path, stderr_tail, exit_rx, stop_tx }
    }

    /// Current exit code if the process has exited, `None` if still live.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.exit_code().is_none()
    }

    /// A receiver that resolves once the process exits. Used by the
    /// Fleet to race its readiness probe against worker exit without
    /// borrowing the handle itself across an `.await`.
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.exit_rx.clone()
    }

    /// Resolve once the process has exited, yielding its exit code
    /// (spec §4.4 monitor task: "populates `exit_code`, closes
    /// `exit_event`"). -1 if the process was killed by a signal.
    pub async fn exited(&self) -> i32 {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return code;
            }
            if rx.changed().await.is_err() {
                return -1;
            }
        }
    }

    /// Stop the worker (spec §4.4 `stop`): SIGTERM the process group,
    /// wait up to `grace`, escalate to SIGKILL. No-op if already exited.
    /// Idempotent — safe to call concurrently or more than once.
    pub async fn stop(&self, grace: Duration) {
        if !self.is_live() {
            return;
        }
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        if self.stop_tx.send(StopRequest { grace, done: done_tx }).await.is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.exited().await;
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Abstraction over spawning a worker process, so `substrate-engine`'s
/// Fleet can be tested without real OS processes (§4.4 is the only
/// component in the tree that forks).
#[async_trait]
pub trait ProcessAdapter: Send + Sync + 'static {
    async fn start(&self, spec: SpawnSpec) -> Result<WorkerHandle, SpawnError>;
}

/// The real adapter: spawns `interpreter script_path socket_path` as a
/// child of this process (spec §4.4).
pub struct RealProcessAdapter;

#[async_trait]
impl ProcessAdapter for RealProcessAdapter {
    async fn start(&self, spec: SpawnSpec) -> Result<WorkerHandle, SpawnError> {
        if !spec.interpreter_path.is_file() {
            return Err(SpawnError::BinaryNotFound(spec.interpreter_path));
        }

        let cwd = spec.script_key.script_dir().map(|p| p.to_path_buf());
        let _ = std::fs::remove_file(&spec.socket_path);

        let mut std_cmd = std::process::Command::new(&spec.interpreter_path);
        std_cmd
            .arg(spec.script_key.as_path())
            .arg(&spec.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // New process group so `stop` can signal the whole tree
            // (spec §4.4 "place the child in a new process group").
            .process_group(0);
        if let Some(cwd) = &cwd {
            std_cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            std_cmd.env(key, value);
        }
        if let Some((uid, gid)) = spec.drop_to {
            std_cmd.uid(uid);
            std_cmd.gid(gid);
        }

        let mut child = tokio::process::Command::from(std_cmd).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                SpawnError::PermissionDenied(e.to_string())
            } else {
                SpawnError::Io(e.to_string())
            }
        })?;

        let pid = child.id().ok_or_else(|| SpawnError::Io("child exited before id()".into()))?;
        let pgid = Pid::from_raw(pid as i32);
        let stderr_tail = StderrTail::new(spec.stderr_tail_bytes);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(ring_writer::drain_stdout(pid, stdout));
        }
        let stderr_drained = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(ring_writer::drain_stderr(pid, stderr, stderr_tail.clone())));

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        tracing::info!(
            pid,
            script = %spec.script_key,
            socket_path = %spec.socket_path.display(),
            "worker spawned"
        );

        tokio::spawn(supervise(child, pid, pgid, exit_tx, stop_rx, spec.script_key, stderr_drained));

        Ok(WorkerHandle { pid, socket_path: spec.socket_path, stderr_tail, exit_rx, stop_tx })
    }
}

/// Owns the `Child` for its whole lifetime: observes natural exit, or
/// handles a `stop` request's SIGTERM-then-SIGKILL escalation. Exactly
/// one of these two outcomes fires, exactly once (spec §4.4 "invokes
/// the Fleet's `on_exit(script_key)` callback exactly once" — here
/// represented by resolving `exit_tx` exactly once).
async fn supervise(
    mut child: tokio::process::Child,
    pid: u32,
    pgid: Pid,
    exit_tx: watch::Sender<Option<i32>>,
    mut stop_rx: mpsc::Receiver<StopRequest>,
    script_key: ScriptKey,
    stderr_drained: Option<tokio::task::JoinHandle<()>>,
) {
    let code = tokio::select! {
        status = child.wait() => {
            exit_code_from(status)
        }
        Some(req) = stop_rx.recv() => {
            let _ = killpg(pgid, Signal::SIGTERM);
            let code = match tokio::time::timeout(req.grace, child.wait()).await {
                Ok(status) => exit_code_from(status),
                Err(_) => {
                    tracing::warn!(pid, "grace period elapsed, sending SIGKILL");
                    let _ = killpg(pgid, Signal::SIGKILL);
                    exit_code_from(child.wait().await)
                }
            };
            let _ = req.done.send(());
            code
        }
    };

    // The stderr pipe's write end closes once the child (and anything
    // that inherited its fds) has fully exited, so the drain task is
    // guaranteed to reach EOF here. Wait for it before publishing the
    // exit code, so a caller racing `exited()` against `stderr_tail()`
    // (as the Prober does) always sees a fully populated tail.
    if let Some(handle) = stderr_drained {
        let _ = handle.await;
    }

    tracing::info!(pid, script = %script_key, exit_code = code, "worker exited");
    let _ = exit_tx.send(Some(code));
}

fn exit_code_from(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            tracing::warn!(error = %e, "wait() on worker failed");
            -1
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
