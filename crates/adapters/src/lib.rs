// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! substrate-adapters: the Worker (spec §4.4) and Readiness Prober
//! (spec §4.5) — the only components that touch a real OS process.

pub mod probe;
pub mod ring_writer;
pub mod uid;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use probe::{wait_ready, ProbeError};
pub use worker::{ProcessAdapter, RealProcessAdapter, SpawnSpec, WorkerHandle};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeOutcome, FakeProcessAdapter};
