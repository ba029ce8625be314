// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script identity (spec §3): the cleaned absolute path to a worker
//! script, and the Fleet's only record identifier.
//!
//! Two symlinks to the same backing file are two independent
//! `ScriptKey`s by design (spec §9 "Symlinks as identity") — the key is
//! the path as given, never the resolved target.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptKey(PathBuf);

impl ScriptKey {
    /// Construct a key from an already-validated absolute path. Callers
    /// outside `substrate-engine`'s Path Validator should not construct
    /// this directly; use the validator instead.
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The directory a worker for this script should use as its cwd,
    /// per the "as-given path" decision in SPEC_FULL.md §6.
    pub fn script_dir(&self) -> Option<&Path> {
        self.0.parent()
    }
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Borrow<Path> for ScriptKey {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ScriptKey {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_distinct_paths_are_distinct_keys_even_if_same_inode() {
        let a = ScriptKey::new(PathBuf::from("/srv/scripts/a.js"));
        let b = ScriptKey::new(PathBuf::from("/srv/scripts/link-to-a.js"));
        assert_ne!(a, b);
    }

    #[test]
    fn script_dir_is_the_parent_of_the_given_path() {
        let key = ScriptKey::new(PathBuf::from("/srv/scripts/a.js"));
        assert_eq!(key.script_dir(), Some(Path::new("/srv/scripts")));
    }

    #[test]
    fn display_renders_the_path() {
        let key = ScriptKey::new(PathBuf::from("/srv/scripts/a.js"));
        assert_eq!(key.to_string(), "/srv/scripts/a.js");
    }
}
