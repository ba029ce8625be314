// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path Validator (spec §4.2): rejects non-absolute, traversal,
//! missing, or non-regular script paths before any process work begins.

use std::path::{Component, Path, PathBuf};
use substrate_core::{PathError, ScriptKey};

/// Validate and wrap a script path as a [`ScriptKey`].
///
/// Symlinks to regular files are accepted; the returned key is the path
/// as given, never the resolved target (spec §4.2, §9 "Symlinks as
/// identity") — so two symlinks to the same backing file yield two
/// independent keys.
pub fn validate(path: &Path) -> Result<ScriptKey, PathError> {
    if path.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }
    if !path.is_absolute() {
        return Err(PathError::NotAbsolute(path.to_path_buf()));
    }
    if has_traversal_component(path) {
        return Err(PathError::Traversal(path.to_path_buf()));
    }

    let metadata = std::fs::symlink_metadata(path)
        .and_then(|meta| if meta.file_type().is_symlink() { std::fs::metadata(path) } else { Ok(meta) })
        .map_err(|_| PathError::NotFound(path.to_path_buf()))?;

    if !metadata.is_file() {
        return Err(PathError::NotRegularFile(path.to_path_buf()));
    }

    Ok(ScriptKey::new(path.to_path_buf()))
}

fn has_traversal_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
