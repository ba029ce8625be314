// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded ring buffer for a worker's stderr tail (spec §3, §9).
//!
//! The 4 KiB default is a trade-off between diagnostic value and bounded
//! memory per dead worker (spec §9); callers may configure a smaller
//! value but never above [`StderrTail::HARD_CEILING_BYTES`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Clone)]
pub struct StderrTail {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl StderrTail {
    pub const DEFAULT_CAPACITY_BYTES: usize = 4 * 1024;
    pub const HARD_CEILING_BYTES: usize = 64 * 1024;

    pub fn new(capacity_bytes: usize) -> Self {
        let capacity = capacity_bytes.min(Self::HARD_CEILING_BYTES);
        Self { inner: Arc::new(Mutex::new(Inner { buf: VecDeque::with_capacity(capacity), capacity })) }
    }

    /// Append bytes, dropping the oldest bytes first once over capacity.
    pub fn append(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        let capacity = inner.capacity;
        for &b in bytes {
            if inner.buf.len() >= capacity {
                inner.buf.pop_front();
            }
            inner.buf.push_back(b);
        }
    }

    /// A lossy UTF-8 snapshot of the currently retained tail.
    pub fn snapshot(&self) -> String {
        let inner = self.inner.lock();
        let bytes: Vec<u8> = inner.buf.iter().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().buf.is_empty()
    }

    /// Raw byte length currently retained (never exceeds capacity).
    pub fn len_bytes(&self) -> usize {
        self.inner.lock().buf.len()
    }
}

impl Default for StderrTail {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY_BYTES)
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
