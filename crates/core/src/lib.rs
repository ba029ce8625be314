// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! substrate-core: data model and error taxonomy for the process-fleet
//! controller.
//!
//! This crate holds the pure, I/O-free pieces shared by
//! `substrate-adapters`, `substrate-engine`, and `substrate-router`: the
//! script identity type, worker lifecycle state, the controller's
//! configuration surface, the error taxonomy, a testable clock, and the
//! bounded stderr ring buffer.

pub mod macros;

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod ring;
pub mod script_key;
pub mod state;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ControllerConfig, IdleTimeout};
pub use error::{
    Crashed, DownloadError, FleetError, Phase, PathError, RoundTripError, SpawnError,
    StartupTimeout,
};
pub use id::random_suffix;
pub use ring::StderrTail;
pub use script_key::ScriptKey;
pub use state::WorkerState;
