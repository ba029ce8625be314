// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (spec §7).
//!
//! One `thiserror` enum per failure kind, plus [`FleetError`] which unifies
//! them for `Fleet::get_socket`'s return type. Each variant that can occur
//! after a process has been spawned carries the diagnostics
//! (`exit_code`, `stderr_tail`) needed by the Error Formatter (§4.8) to
//! produce a trusted-caller diagnostic body.

use crate::state::WorkerState;
use std::path::PathBuf;

/// Which lifecycle phase a failure was observed in, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Ready,
    Running,
}

impl From<WorkerState> for Phase {
    fn from(state: WorkerState) -> Self {
        match state {
            WorkerState::Starting => Phase::Starting,
            WorkerState::Ready => Phase::Ready,
            WorkerState::Exited | WorkerState::Stopping => Phase::Running,
        }
    }
}

crate::simple_display! {
    Phase {
        Starting => "starting",
        Ready => "ready",
        Running => "running",
    }
}

/// Script path rejected by the Path Validator (§4.2). Never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PathError {
    #[error("script path is empty")]
    Empty,
    #[error("script path {0:?} is not absolute")]
    NotAbsolute(PathBuf),
    #[error("script path {0:?} contains a traversal component after cleaning")]
    Traversal(PathBuf),
    #[error("script path {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("script path {0:?} is not a regular file")]
    NotRegularFile(PathBuf),
}

/// The OS could not create the worker process. Never retried; no exit code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpawnError {
    #[error("interpreter binary not found at {0:?}")]
    BinaryNotFound(PathBuf),
    #[error("permission denied spawning worker: {0}")]
    PermissionDenied(String),
    #[error("failed to drop privileges to uid {uid}: {message}")]
    PrivilegeDropFailed { uid: u32, message: String },
    #[error("failed to spawn worker process: {0}")]
    Io(String),
}

/// `startup_timeout` elapsed before the worker accepted a connection.
#[derive(Debug, Clone, thiserror::Error)]
#[error("worker startup timed out after {elapsed_ms} ms")]
pub struct StartupTimeout {
    pub elapsed_ms: u64,
    /// -1 if the process had not yet exited when the timeout fired.
    pub exit_code: i32,
    pub stderr_tail: String,
}

/// The worker exited before becoming ready.
#[derive(Debug, Clone, thiserror::Error)]
#[error("worker exited with code {exit_code} before becoming ready")]
pub struct Crashed {
    pub exit_code: i32,
    pub stderr_tail: String,
}

/// An in-flight request to a Ready worker failed. Never retried internally.
#[derive(Debug, Clone, thiserror::Error)]
#[error("round trip to worker failed: {0}")]
pub struct RoundTripError(pub String);

/// The Runtime Provisioner could not obtain the interpreter binary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to provision runtime {version} for {platform}: {message}")]
pub struct DownloadError {
    pub version: String,
    pub platform: String,
    pub message: String,
}

/// Unified failure returned by `Fleet::get_socket`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    StartupTimeout(#[from] StartupTimeout),
    #[error(transparent)]
    Crashed(#[from] Crashed),
}

impl FleetError {
    /// The lifecycle phase this failure was observed in.
    pub fn phase(&self) -> Phase {
        match self {
            FleetError::Path(_) | FleetError::Spawn(_) => Phase::Starting,
            FleetError::StartupTimeout(_) => Phase::Starting,
            FleetError::Crashed(_) => Phase::Starting,
        }
    }

    /// Exit code if a process was observed to exit; `None` for failures
    /// that never reached a spawned process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FleetError::StartupTimeout(e) => Some(e.exit_code),
            FleetError::Crashed(e) => Some(e.exit_code),
            FleetError::Path(_) | FleetError::Spawn(_) => None,
        }
    }

    /// Stderr captured before failure, if any.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            FleetError::StartupTimeout(e) => Some(&e.stderr_tail),
            FleetError::Crashed(e) => Some(&e.stderr_tail),
            FleetError::Path(_) | FleetError::Spawn(_) => None,
        }
    }

    /// Whether this failure is attributable to a socket/port allocation
    /// race and therefore eligible for the bounded internal retry (§7).
    ///
    /// `Crashed`/`StartupTimeout` alone are not enough evidence: a script
    /// that deterministically crashes (a syntax error, a missing
    /// dependency) also surfaces as one of those two variants, and
    /// retrying it three times before giving up is exactly the
    /// thundering-herd-on-a-broken-script behavior §9 says this design
    /// avoids. Require the worker's own stderr to actually say its
    /// `bind()` collided with another process before treating the
    /// failure as a race.
    pub fn is_allocation_race(&self) -> bool {
        match self {
            FleetError::Crashed(e) => stderr_indicates_socket_race(&e.stderr_tail),
            FleetError::StartupTimeout(e) => stderr_indicates_socket_race(&e.stderr_tail),
            FleetError::Path(_) | FleetError::Spawn(_) => false,
        }
    }
}

/// Substrings an OS bind-failure error message contains when a worker's
/// `bind()` on its allocated UNIX socket path collided with another
/// process — the one case spec §7 restricts internal retries to. A
/// script's own crash output essentially never contains these, since
/// they're the OS's wording, not anything a script would print.
const SOCKET_RACE_STDERR_MARKERS: &[&str] = &["address already in use", "eaddrinuse"];

fn stderr_indicates_socket_race(stderr_tail: &str) -> bool {
    let lower = stderr_tail.to_ascii_lowercase();
    SOCKET_RACE_STDERR_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
