// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented capture of a worker's stdout/stderr (spec §4.4, §9).
//!
//! Stdout is forwarded to `tracing` only — the host process logs it, but
//! it is never part of the diagnostic surface returned to callers.
//! Stderr is both logged and appended to the worker's [`StderrTail`]
//! ring buffer, which is what the Error Formatter (§4.8) surfaces.

use substrate_core::StderrTail;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Drain a worker's stdout, one line at a time, into `tracing::debug!`.
pub async fn drain_stdout<R: AsyncRead + Unpin>(pid: u32, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(pid, stream = "stdout", %line, "worker output"),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(pid, error = %e, "stdout reader failed");
                return;
            }
        }
    }
}

/// Drain a worker's stderr into both `tracing::debug!` and `tail`.
pub async fn drain_stderr<R: AsyncRead + Unpin>(pid: u32, reader: R, tail: StderrTail) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(pid, stream = "stderr", %line, "worker output");
                tail.append(line.as_bytes());
                tail.append(b"\n");
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(pid, error = %e, "stderr reader failed");
                return;
            }
        }
    }
}
