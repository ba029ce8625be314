// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extract a single named entry (the interpreter binary) out of a
//! downloaded release archive. Supports `.tar.gz` and `.zip`, chosen by
//! the archive URL's extension.

use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub(crate) fn from_url(url: &str) -> Self {
        if url.ends_with(".zip") {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        }
    }
}

/// Extract `entry_name` from `archive_path` into `dest_path`. The entry
/// is matched by its file name, ignoring any directory prefix the
/// archive format stores it under.
pub(crate) fn extract_entry(
    archive_path: &Path,
    kind: ArchiveKind,
    entry_name: &str,
    dest_path: &Path,
) -> io::Result<()> {
    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive_path, entry_name, dest_path),
        ArchiveKind::Zip => extract_zip(archive_path, entry_name, dest_path),
    }
}

fn extract_tar_gz(archive_path: &Path, entry_name: &str, dest_path: &Path) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if path.file_name().map(|n| n == entry_name).unwrap_or(false) {
            let mut out = File::create(dest_path)?;
            io::copy(&mut entry, &mut out)?;
            return Ok(());
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("entry {entry_name:?} not found in tar.gz archive"),
    ))
}

fn extract_zip(archive_path: &Path, entry_name: &str, dest_path: &Path) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry =
            archive.by_index(i).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let matches = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
            .map(|n| n == std::ffi::OsStr::new(entry_name))
            .unwrap_or(false);
        if matches {
            let mut out = File::create(dest_path)?;
            io::copy(&mut entry, &mut out)?;
            return Ok(());
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("entry {entry_name:?} not found in zip archive"),
    ))
}
