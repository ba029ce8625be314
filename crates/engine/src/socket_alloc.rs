// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket Allocator (spec §4.3): produces `socket_path` values of the
//! form `<runtime_dir>/substrate-<random>.sock`, guaranteed not to
//! exist at the moment of return. The path is best-effort-unique only —
//! the Worker itself fails fast on a bind collision.

use std::path::{Path, PathBuf};
use substrate_core::random_suffix;

pub fn allocate(runtime_dir: &Path) -> PathBuf {
    loop {
        let candidate = runtime_dir.join(format!("substrate-{}.sock", random_suffix()));
        if !candidate.exists() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocated_path_does_not_exist() {
        let dir = tempdir().unwrap();
        let path = allocate(dir.path());
        assert!(!path.exists());
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn allocated_path_has_the_substrate_sock_shape() {
        let dir = tempdir().unwrap();
        let path = allocate(dir.path());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("substrate-"));
        assert!(name.ends_with(".sock"));
    }

    #[test]
    fn successive_allocations_are_distinct() {
        let dir = tempdir().unwrap();
        let a = allocate(dir.path());
        let b = allocate(dir.path());
        assert_ne!(a, b);
    }
}
