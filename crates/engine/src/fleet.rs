// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet Controller (spec §4.6): the map of live workers keyed by
//! script path, singleflight startup, idle/one-shot reaping,
//! exit-driven removal.
//!
//! No teacher analogue exists for a process fleet, but the shape — a
//! coarse-locked shared map plus per-connection background tasks
//! spawned with `Arc::clone` of shared context — follows
//! `crates/daemon/src/listener/mod.rs`'s `ListenCtx`/`Listener` pattern.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use substrate_adapters::{probe, ProbeError, ProcessAdapter, RealProcessAdapter, SpawnSpec, WorkerHandle};
use substrate_core::{
    Clock, ControllerConfig, Crashed, FleetError, IdleTimeout, ScriptKey, WorkerState,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::socket_alloc;
use crate::validate;

struct Record {
    script_key: ScriptKey,
    socket_path: PathBuf,
    state: Mutex<WorkerState>,
    last_used: Mutex<std::time::Instant>,
    worker: Mutex<Option<Arc<WorkerHandle>>>,
    ready_tx: watch::Sender<Option<Result<(), FleetError>>>,
}

/// A snapshot of one worker for health reporting (SPEC_FULL.md §5
/// supplemented feature — not part of the request path).
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub script_key: String,
    pub socket_path: PathBuf,
    pub state: WorkerState,
    pub pid: Option<u32>,
}

/// Owns every live worker, keyed by script path (spec §3, §4.6).
pub struct Fleet<P: ProcessAdapter = RealProcessAdapter> {
    config: ControllerConfig,
    runtime_dir: PathBuf,
    interpreter_path: PathBuf,
    adapter: Arc<P>,
    clock: Arc<dyn Clock>,
    records: Arc<Mutex<HashMap<ScriptKey, Arc<Record>>>>,
    reaper_cancel: CancellationToken,
    reaper_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<P: ProcessAdapter> Fleet<P> {
    /// Construct a Fleet and start its background idle reaper.
    pub fn new(
        config: ControllerConfig,
        runtime_dir: PathBuf,
        interpreter_path: PathBuf,
        adapter: Arc<P>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let fleet = Arc::new(Self {
            config,
            runtime_dir,
            interpreter_path,
            adapter,
            clock,
            records: Arc::new(Mutex::new(HashMap::new())),
            reaper_cancel: CancellationToken::new(),
            reaper_handle: Mutex::new(None),
        });
        let handle = spawn_reaper(Arc::clone(&fleet));
        *fleet.reaper_handle.lock() = Some(handle);
        fleet
    }

    pub fn idle_timeout(&self) -> IdleTimeout {
        self.config.idle_timeout
    }

    /// Current live worker count, for metrics/health endpoints.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.records
            .lock()
            .values()
            .map(|record| WorkerSnapshot {
                script_key: record.script_key.to_string(),
                socket_path: record.socket_path.clone(),
                state: *record.state.lock(),
                pid: record.worker.lock().as_ref().map(|w| w.pid),
            })
            .collect()
    }

    /// spec §4.6 `get_socket`. Retries up to `max_start_attempts` times
    /// when a failure is attributable to an allocation race.
    pub async fn get_socket(&self, script_path: &Path) -> Result<PathBuf, FleetError> {
        let attempts = self.config.max_start_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            match self.try_get_socket(script_path).await {
                Ok(path) => return Ok(path),
                Err(err)
                    if attempt + 1 < attempts
                        && self.config.retry_on_socket_race
                        && err.is_allocation_race() =>
                {
                    tracing::warn!(
                        attempt,
                        script = %script_path.display(),
                        error = %err,
                        "retrying get_socket after a suspected allocation race"
                    );
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop executes at least once"))
    }

    /// Bump `last_used` after a successful round trip (spec §4.7 step 5).
    pub fn note_used(&self, script_path: &Path) {
        if let Some(record) = self.records.lock().get(script_path) {
            *record.last_used.lock() = self.clock.now();
        }
    }

    /// Stop and remove a record without blocking the caller (spec §4.7
    /// step 5, one-shot mode).
    pub fn stop_and_remove(&self, script_path: &Path) {
        let record = self.records.lock().get(script_path).cloned();
        let Some(record) = record else { return };
        let records = Arc::clone(&self.records);
        let grace = self.config.stop_grace;
        tokio::spawn(async move {
            let worker = record.worker.lock().clone();
            if let Some(worker) = worker {
                worker.stop(grace).await;
            }
            purge_if_current(&records, &record.script_key, &record);
        });
    }

    /// spec §4.6 `shutdown`: cancel the reaper, then stop every worker
    /// concurrently, awaiting each.
    pub async fn shutdown(&self) {
        self.reaper_cancel.cancel();
        if let Some(handle) = self.reaper_handle.lock().take() {
            let _ = handle.await;
        }
        let records: Vec<Arc<Record>> = self.records.lock().drain().map(|(_, v)| v).collect();
        let grace = self.config.stop_grace;
        let handles: Vec<_> = records
            .into_iter()
            .map(|record| {
                tokio::spawn(async move {
                    let worker = record.worker.lock().clone();
                    if let Some(worker) = worker {
                        worker.stop(grace).await;
                    }
                    let _ = std::fs::remove_file(&record.socket_path);
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// One sweep of the idle reaper (spec §4.6 `reaper`). Exposed so
    /// tests can drive eviction deterministically against a `FakeClock`
    /// instead of waiting on the real periodic loop.
    pub async fn run_reaper_sweep(&self) {
        let idle_after = match self.config.idle_timeout {
            IdleTimeout::After(d) => d,
            IdleTimeout::Never | IdleTimeout::OneShot => return,
        };

        let candidates: Vec<Arc<Record>> = {
            let records = self.records.lock();
            records
                .values()
                .filter(|r| *r.state.lock() == WorkerState::Ready)
                .cloned()
                .collect()
        };

        for record in candidates {
            // Recheck `last_used` under the lock immediately before
            // stopping (spec §5 ordering guarantee) so a request that
            // just bumped it is never evicted out from under it.
            let still_idle = {
                let records = self.records.lock();
                match records.get(&record.script_key) {
                    Some(current) if Arc::ptr_eq(current, &record) => {
                        self.clock.now().duration_since(*record.last_used.lock()) >= idle_after
                    }
                    _ => false,
                }
            };
            if !still_idle {
                continue;
            }
            let worker = record.worker.lock().clone();
            if let Some(worker) = worker {
                worker.stop(self.config.stop_grace).await;
            }
            purge_if_current(&self.records, &record.script_key, &record);
        }
    }

    async fn try_get_socket(&self, script_path: &Path) -> Result<PathBuf, FleetError> {
        enum Lookup {
            Ready(PathBuf),
            Wait(Arc<Record>),
            ColdStart,
        }

        let lookup = {
            let records = self.records.lock();
            match records.get(script_path) {
                Some(record) => match *record.state.lock() {
                    WorkerState::Ready => {
                        *record.last_used.lock() = self.clock.now();
                        Lookup::Ready(record.socket_path.clone())
                    }
                    WorkerState::Starting => Lookup::Wait(Arc::clone(record)),
                    WorkerState::Stopping | WorkerState::Exited => Lookup::ColdStart,
                },
                None => Lookup::ColdStart,
            }
        };

        match lookup {
            Lookup::Ready(path) => Ok(path),
            Lookup::Wait(record) => self.await_existing(record).await,
            Lookup::ColdStart => self.cold_start(script_path).await,
        }
    }

    async fn await_existing(&self, record: Arc<Record>) -> Result<PathBuf, FleetError> {
        let mut rx = record.ready_tx.subscribe();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result.map(|()| record.socket_path.clone());
            }
            if rx.changed().await.is_err() {
                return Err(FleetError::Crashed(Crashed {
                    exit_code: -1,
                    stderr_tail: String::new(),
                }));
            }
        }
    }

    async fn cold_start(&self, script_path: &Path) -> Result<PathBuf, FleetError> {
        let script_key = validate::validate(script_path)?;

        let (record, is_owner) = {
            let mut records = self.records.lock();
            if let Some(existing) = records.get(&script_key) {
                (Arc::clone(existing), false)
            } else {
                let socket_path = socket_alloc::allocate(&self.runtime_dir);
                let (ready_tx, _rx) = watch::channel(None);
                let record = Arc::new(Record {
                    script_key: script_key.clone(),
                    socket_path,
                    state: Mutex::new(WorkerState::Starting),
                    last_used: Mutex::new(self.clock.now()),
                    worker: Mutex::new(None),
                    ready_tx,
                });
                records.insert(script_key.clone(), Arc::clone(&record));
                (record, true)
            }
        };

        if !is_owner {
            return self.await_existing(record).await;
        }

        let result = self.spawn_and_probe(&script_key, &record).await;

        match &result {
            Ok(()) => {
                *record.state.lock() = WorkerState::Ready;
                *record.last_used.lock() = self.clock.now();
                let _ = record.ready_tx.send(Some(Ok(())));
            }
            Err(err) => {
                *record.state.lock() = WorkerState::Stopping;
                let worker = record.worker.lock().clone();
                if let Some(worker) = worker {
                    worker.stop(self.config.stop_grace).await;
                }
                purge_if_current(&self.records, &script_key, &record);
                let _ = record.ready_tx.send(Some(Err(err.clone())));
            }
        }

        result.map(|()| record.socket_path.clone())
    }

    async fn spawn_and_probe(
        &self,
        script_key: &ScriptKey,
        record: &Arc<Record>,
    ) -> Result<(), FleetError> {
        let drop_to = self.resolve_drop_to(script_key)?;
        let spec = SpawnSpec {
            script_key: script_key.clone(),
            interpreter_path: self.interpreter_path.clone(),
            socket_path: record.socket_path.clone(),
            env: self.config.env.clone(),
            drop_to,
            stderr_tail_bytes: self.config.stderr_tail_bytes,
        };

        let worker = Arc::new(self.adapter.start(spec).await?);
        *record.worker.lock() = Some(Arc::clone(&worker));

        spawn_exit_watcher(
            Arc::clone(&self.records),
            script_key.clone(),
            Arc::clone(record),
            Arc::clone(&worker),
        );

        probe::wait_ready(
            &record.socket_path,
            wait_for_exit(worker.exit_watch()),
            {
                let worker = Arc::clone(&worker);
                move || worker.stderr_tail.snapshot()
            },
            self.config.startup_timeout,
        )
        .await
        .map_err(probe_err_to_fleet_err)
    }

    fn resolve_drop_to(&self, script_key: &ScriptKey) -> Result<Option<(u32, u32)>, FleetError> {
        if let Some(user) = &self.config.user {
            let resolved = substrate_adapters::uid::resolve(user)?;
            return Ok(Some(resolved));
        }
        if nix::unistd::geteuid().is_root() {
            if let Ok(meta) = std::fs::metadata(script_key.as_path()) {
                use std::os::unix::fs::MetadataExt;
                if meta.uid() != 0 {
                    return Ok(Some((meta.uid(), meta.gid())));
                }
            }
        }
        Ok(None)
    }
}

fn spawn_reaper<P: ProcessAdapter>(fleet: Arc<Fleet<P>>) -> tokio::task::JoinHandle<()> {
    let token = fleet.reaper_cancel.clone();
    let period = fleet.config.reaper_period;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(period) => {
                    fleet.run_reaper_sweep().await;
                }
            }
        }
    })
}

fn spawn_exit_watcher(
    records: Arc<Mutex<HashMap<ScriptKey, Arc<Record>>>>,
    script_key: ScriptKey,
    record: Arc<Record>,
    worker: Arc<WorkerHandle>,
) {
    tokio::spawn(async move {
        let code = wait_for_exit(worker.exit_watch()).await;
        tracing::info!(script = %script_key, exit_code = code, "fleet observed worker exit");
        let _ = record.ready_tx.send(Some(Err(FleetError::Crashed(Crashed {
            exit_code: code,
            stderr_tail: worker.stderr_tail.snapshot(),
        }))));
        purge_if_current(&records, &script_key, &record);
    });
}

async fn wait_for_exit(mut rx: watch::Receiver<Option<i32>>) -> i32 {
    loop {
        if let Some(code) = *rx.borrow() {
            return code;
        }
        if rx.changed().await.is_err() {
            return -1;
        }
    }
}

fn probe_err_to_fleet_err(err: ProbeError) -> FleetError {
    match err {
        ProbeError::StartupTimeout(e) => FleetError::StartupTimeout(e),
        ProbeError::Crashed(e) => FleetError::Crashed(e),
    }
}

/// Remove `record` from the map iff it is still the current occupant of
/// `script_key` (spec §4.6 `on_exit`: "if the map still points at the
/// same record instance, delete it"). A double-destroy is a no-op.
fn purge_if_current(
    records: &Mutex<HashMap<ScriptKey, Arc<Record>>>,
    script_key: &ScriptKey,
    record: &Arc<Record>,
) {
    let removed = {
        let mut records = records.lock();
        match records.get(script_key) {
            Some(current) if Arc::ptr_eq(current, record) => {
                records.remove(script_key);
                true
            }
            _ => false,
        }
    };
    if removed {
        let _ = std::fs::remove_file(&record.socket_path);
    }
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod tests;
