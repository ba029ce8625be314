// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup/shutdown ordering (SPEC_FULL.md §5 "Graceful daemon
//! shutdown"), grounded on the teacher's `lifecycle/startup.rs`: create
//! directories, acquire an exclusive lock file before writing the PID
//! into it (never truncate-then-fail), provision the interpreter, build
//! the Fleet, and bind the listener LAST so no partially-initialized
//! daemon ever appears reachable.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use substrate_adapters::RealProcessAdapter;
use substrate_core::{DownloadError, SystemClock};
use substrate_engine::Fleet;
use substrate_provisioner::Provisioner;
use tokio::net::TcpListener;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to create directory {0:?}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to open lock file {0:?}: {1}")]
    OpenLock(PathBuf, std::io::Error),
    #[error("another substrate daemon already holds the lock at {0:?}")]
    LockHeld(PathBuf),
    #[error("failed to write pid file {0:?}: {1}")]
    WritePid(PathBuf, std::io::Error),
    #[error("failed to provision the interpreter runtime: {0}")]
    Provision(#[from] DownloadError),
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
}

/// Everything a running daemon needs, handed back by [`startup`].
pub struct StartupResult {
    pub fleet: Arc<Fleet<RealProcessAdapter>>,
    pub listener: TcpListener,
    /// Held for the daemon's lifetime; dropping it releases the lock.
    _lock_file: std::fs::File,
}

pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    create_dir(&config.state_dir)?;
    create_dir(&config.runtime_dir)?;
    create_dir(&config.cache_root)?;

    let lock_file = acquire_lock(&config.state_dir.join("substrate.lock"))?;

    let provisioner = Provisioner::new(config.cache_root.clone(), config.interpreter.clone());
    let interpreter_path = provisioner.ensure().await?;

    let adapter = Arc::new(RealProcessAdapter);
    let clock = Arc::new(SystemClock);
    let fleet = Fleet::new(
        config.controller.clone(),
        config.runtime_dir.clone(),
        interpreter_path,
        adapter,
        clock,
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| LifecycleError::Bind(config.listen_addr, e))?;

    Ok(StartupResult { fleet, listener, _lock_file: lock_file })
}

/// Graceful shutdown: stop accepting work and drain every live worker
/// (spec §4.6 `shutdown`), honoring each worker's stop grace period
/// rather than killing the process tree out from under them.
pub async fn shutdown(fleet: &Fleet<RealProcessAdapter>) {
    tracing::info!("shutting down: draining the fleet");
    fleet.shutdown().await;
}

fn create_dir(path: &std::path::Path) -> Result<(), LifecycleError> {
    std::fs::create_dir_all(path).map_err(|e| LifecycleError::CreateDir(path.to_path_buf(), e))
}

/// Open (without truncating) and exclusively lock `lock_path`, then
/// write this process's PID into it — in that order, so a daemon that
/// loses the lock race never clobbers the PID of the one that holds it.
fn acquire_lock(lock_path: &std::path::Path) -> Result<std::fs::File, LifecycleError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| LifecycleError::OpenLock(lock_path.to_path_buf(), e))?;

    file.try_lock_exclusive().map_err(|_| LifecycleError::LockHeld(lock_path.to_path_buf()))?;

    file.set_len(0).map_err(|e| LifecycleError::WritePid(lock_path.to_path_buf(), e))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| LifecycleError::WritePid(lock_path.to_path_buf(), e))?;
    writeln!(file, "{}", std::process::id())
        .map_err(|e| LifecycleError::WritePid(lock_path.to_path_buf(), e))?;
    file.flush().map_err(|e| LifecycleError::WritePid(lock_path.to_path_buf(), e))?;

    Ok(file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
