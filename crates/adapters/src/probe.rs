// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Readiness Prober (spec §4.5): block until a freshly spawned worker
//! accepts a connection on its socket, or fail with a classified reason.

use std::path::Path;
use std::time::Duration;
use substrate_core::{Crashed, StartupTimeout};
use tokio::net::UnixStream;
use tokio::time::Instant;

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    StartupTimeout(#[from] StartupTimeout),
    #[error(transparent)]
    Crashed(#[from] Crashed),
}

/// Poll `socket_path` until it accepts a connection (closed immediately),
/// the worker exits, or `deadline` elapses. `exited` resolves with the
/// worker's exit code the moment it terminates — used to race against
/// the polling loop exactly as spec §4.5 requires ("Returns Crashed if
/// the associated worker's `exit_event` fires before success").
pub async fn wait_ready(
    socket_path: &Path,
    exited: impl std::future::Future<Output = i32>,
    stderr_tail: impl Fn() -> String,
    deadline: Duration,
) -> Result<(), ProbeError> {
    tokio::pin!(exited);
    let started = Instant::now();
    let deadline_at = started + deadline;

    loop {
        let attempt = tokio::time::timeout(PER_ATTEMPT_TIMEOUT, UnixStream::connect(socket_path));
        tokio::select! {
            biased;
            code = &mut exited => {
                return Err(Crashed { exit_code: code, stderr_tail: stderr_tail() }.into());
            }
            result = attempt => {
                if let Ok(Ok(_stream)) = result {
                    return Ok(());
                }
            }
        }

        if Instant::now() >= deadline_at {
            return Err(StartupTimeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
                exit_code: -1,
                stderr_tail: stderr_tail(),
            }
            .into());
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn succeeds_once_the_socket_accepts_a_connection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    return;
                }
            }
        });

        let result = wait_ready(&path, pending(), || String::new(), Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn times_out_when_nothing_ever_listens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.sock");
        let result =
            wait_ready(&path, pending(), || "tail".to_string(), Duration::from_millis(100)).await;
        match result {
            Err(ProbeError::StartupTimeout(e)) => assert_eq!(e.stderr_tail, "tail"),
            other => panic!("expected StartupTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_crashed_if_the_worker_exits_before_connecting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.sock");
        let exited = async { 9 };
        let result =
            wait_ready(&path, exited, || "boom".to_string(), Duration::from_secs(5)).await;
        match result {
            Err(ProbeError::Crashed(e)) => {
                assert_eq!(e.exit_code, 9);
                assert_eq!(e.stderr_tail, "boom");
            }
            other => panic!("expected Crashed, got {other:?}"),
        }
    }
}
