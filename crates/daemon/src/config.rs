// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standalone-binary configuration (spec §6 configuration surface, plus
//! the demo host-server knobs SPEC_FULL.md §4.3 adds around it): where
//! state lives on disk, what address to terminate HTTP on, and which
//! interpreter release to provision.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use substrate_core::config::ControllerConfigFile;
use substrate_core::ControllerConfig;
use substrate_provisioner::RuntimeSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid listen_addr {0:?}: {1}")]
    InvalidListenAddr(String, std::net::AddrParseError),
}

/// On-disk shape of the interpreter release pin (maps to
/// [`RuntimeSpec`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InterpreterConfigFile {
    pub version: String,
    pub platform: String,
    pub binary_name: String,
    pub archive_url: String,
}

/// On-disk TOML shape for `substrated`'s config file. The `[controller]`
/// table deserializes directly into [`ControllerConfigFile`]; everything
/// else is specific to standing up the demo host-server boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DaemonConfigFile {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_root: Option<PathBuf>,
    pub interpreter: InterpreterConfigFile,
    /// No `#[serde(default)]` here: `ControllerConfigFile` has no `Default`
    /// impl (each of its own fields defaults individually), so the
    /// config file must at least spell out an empty `[controller]` table.
    pub controller: ControllerConfigFile,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Resolved configuration the rest of `substrate-daemon` is built from.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Root directory request paths resolve under when the host didn't
    /// supply a pre-resolved script path (spec §4.7 step 1 fallback).
    pub root_dir: Option<PathBuf>,
    /// Base directory for the lock file and PID file.
    pub state_dir: PathBuf,
    /// Directory worker sockets are allocated under (spec §4.3, §6).
    pub runtime_dir: PathBuf,
    /// Base directory for the runtime provisioner's version/platform
    /// cache (spec §4.1, §6).
    pub cache_root: PathBuf,
    pub interpreter: RuntimeSpec,
    pub controller: ControllerConfig,
}

impl Config {
    /// Load `config_path`, resolving `runtime_dir`/`cache_root` relative
    /// to `state_dir` when the file leaves them unset.
    pub fn load(config_path: &Path, state_dir: PathBuf) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(config_path)
            .map_err(|e| ConfigError::Read(config_path.to_path_buf(), e))?;
        let file: DaemonConfigFile =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(config_path.to_path_buf(), e))?;

        let listen_addr = file
            .listen_addr
            .parse()
            .map_err(|e| ConfigError::InvalidListenAddr(file.listen_addr.clone(), e))?;

        let runtime_dir = file.runtime_dir.unwrap_or_else(|| state_dir.join("run"));
        let cache_root = file.cache_root.unwrap_or_else(|| state_dir.join("cache"));

        Ok(Config {
            listen_addr,
            root_dir: file.root_dir,
            state_dir,
            runtime_dir,
            cache_root,
            interpreter: RuntimeSpec {
                version: file.interpreter.version,
                platform: file.interpreter.platform,
                binary_name: file.interpreter.binary_name,
                archive_url: file.interpreter.archive_url,
            },
            controller: file.controller.into(),
        })
    }

    pub fn default_path(state_dir: &Path) -> PathBuf {
        state_dir.join("substrate.toml")
    }
}

/// `SUBSTRATE_STATE_DIR` → `XDG_STATE_HOME/substrate` → `~/.local/state/substrate`,
/// mirroring the teacher's `env::state_dir()` fallback chain.
pub fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUBSTRATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("substrate");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
    PathBuf::from(home).join(".local").join("state").join("substrate")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
