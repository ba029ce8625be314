// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! substrate-provisioner: the Runtime Provisioner (spec §4.1). Fetches
//! and caches the interpreter binary for a pinned `version+platform`,
//! using the temp-file-then-rename pattern so concurrent `ensure()`
//! calls on the same cache path never observe a partially written
//! binary.

mod archive;
mod provisioner;

pub use provisioner::{Provisioner, RuntimeSpec};
