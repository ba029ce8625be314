// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! substrate-router: the Request Router (spec §4.7) and Error Formatter
//! (spec §4.8) — the HTTP-facing edge of the process-fleet controller.

pub mod format;
pub mod router;

pub use format::{format_failure, Failure};
pub use router::{Router, SCRIPT_PATH_HEADER};
