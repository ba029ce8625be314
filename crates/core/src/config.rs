// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller configuration surface (spec §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// `idle_timeout`'s three-way policy (spec §4.6, §6):
/// positive = evict after inactivity, zero = never evict,
/// the one-shot sentinel = stop after every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTimeout {
    Never,
    After(Duration),
    OneShot,
}

impl IdleTimeout {
    /// Parse the wire encoding used in config files: seconds, where
    /// negative one is the one-shot sentinel and zero means never.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            s if s < 0 => IdleTimeout::OneShot,
            0 => IdleTimeout::Never,
            s => IdleTimeout::After(Duration::from_secs(s as u64)),
        }
    }
}

/// Options consumed at `Fleet` construction (spec §6 configuration table).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub idle_timeout: IdleTimeout,
    pub startup_timeout: Duration,
    pub env: HashMap<String, String>,
    pub user: Option<String>,
    pub dir: Option<PathBuf>,
    /// Size of each worker's stderr ring buffer. Default 4 KiB (spec §9),
    /// hard-capped by `StderrTail::HARD_CEILING_BYTES`.
    pub stderr_tail_bytes: usize,
    /// Period between idle-reaper sweeps (spec §4.6, default 1 minute).
    pub reaper_period: Duration,
    /// Grace period `Worker::stop` waits before escalating to SIGKILL.
    pub stop_grace: Duration,
    /// Bounded retry count for startup failures attributable to an
    /// allocation race (spec §7).
    pub max_start_attempts: u32,
    /// Whether the allocation-race retry also fires for UNIX-socket
    /// EADDRINUSE, left ambiguous by spec §9 and made an explicit flag
    /// here (SPEC_FULL.md §6 Open Question decisions).
    pub retry_on_socket_race: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IdleTimeout::Never,
            startup_timeout: Duration::from_secs(10),
            env: HashMap::new(),
            user: None,
            dir: None,
            stderr_tail_bytes: crate::ring::StderrTail::DEFAULT_CAPACITY_BYTES,
            reaper_period: Duration::from_secs(60),
            stop_grace: Duration::from_secs(10),
            max_start_attempts: 3,
            retry_on_socket_race: true,
        }
    }
}

/// On-disk TOML shape for `substrate-daemon`'s standalone config file.
/// Deliberately NOT a general configuration language (spec §1 places
/// host configuration-language parsing out of scope) — just the handful
/// of scalar knobs in the table above.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfigFile {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: i64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
    #[serde(default = "default_reaper_period_secs")]
    pub reaper_period_secs: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_max_start_attempts")]
    pub max_start_attempts: u32,
    #[serde(default = "default_retry_on_socket_race")]
    pub retry_on_socket_race: bool,
}

fn default_idle_timeout_secs() -> i64 {
    0
}
fn default_startup_timeout_secs() -> u64 {
    10
}
fn default_stderr_tail_bytes() -> usize {
    crate::ring::StderrTail::DEFAULT_CAPACITY_BYTES
}
fn default_reaper_period_secs() -> u64 {
    60
}
fn default_stop_grace_secs() -> u64 {
    10
}
fn default_max_start_attempts() -> u32 {
    3
}
fn default_retry_on_socket_race() -> bool {
    true
}

impl From<ControllerConfigFile> for ControllerConfig {
    fn from(file: ControllerConfigFile) -> Self {
        Self {
            idle_timeout: IdleTimeout::from_seconds(file.idle_timeout_secs),
            startup_timeout: Duration::from_secs(file.startup_timeout_secs),
            env: file.env,
            user: file.user,
            dir: file.dir,
            stderr_tail_bytes: file.stderr_tail_bytes,
            reaper_period: Duration::from_secs(file.reaper_period_secs),
            stop_grace: Duration::from_secs(file.stop_grace_secs),
            max_start_attempts: file.max_start_attempts,
            retry_on_socket_race: file.retry_on_socket_race,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_one_is_one_shot() {
        assert_eq!(IdleTimeout::from_seconds(-1), IdleTimeout::OneShot);
    }

    #[test]
    fn zero_is_never() {
        assert_eq!(IdleTimeout::from_seconds(0), IdleTimeout::Never);
    }

    #[test]
    fn positive_is_after_duration() {
        assert_eq!(IdleTimeout::from_seconds(30), IdleTimeout::After(Duration::from_secs(30)));
    }

    #[test]
    fn any_negative_value_collapses_to_one_shot() {
        assert_eq!(IdleTimeout::from_seconds(-999), IdleTimeout::OneShot);
    }

    #[test]
    fn default_config_never_evicts_and_retries_allocation_races() {
        let config = ControllerConfig::default();
        assert_eq!(config.idle_timeout, IdleTimeout::Never);
        assert!(config.retry_on_socket_race);
        assert_eq!(config.max_start_attempts, 3);
    }
}
