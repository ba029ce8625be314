// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime Provisioner (spec §4.1): `ensure()` returns a validated,
//! executable interpreter binary for a pinned version+platform, fetching
//! and extracting it into a per-version cache directory on first use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use substrate_core::DownloadError;
use tokio::io::AsyncWriteExt;

use crate::archive::{self, ArchiveKind};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// A pinned interpreter version and target platform, e.g.
/// `("1.4.0", "x86_64-unknown-linux-gnu")`.
#[derive(Debug, Clone)]
pub struct RuntimeSpec {
    pub version: String,
    pub platform: String,
    /// File name of the interpreter binary inside the release archive
    /// and at its cached final path.
    pub binary_name: String,
    /// URL of the release archive for this version+platform. Ends in
    /// `.tar.gz` or `.zip`; the extension selects the extractor.
    pub archive_url: String,
}

/// Caches and validates one [`RuntimeSpec`] under `cache_root`.
pub struct Provisioner {
    cache_root: PathBuf,
    spec: RuntimeSpec,
}

impl Provisioner {
    pub fn new(cache_root: PathBuf, spec: RuntimeSpec) -> Self {
        Self { cache_root, spec }
    }

    /// Final path of the cached interpreter binary, whether or not it
    /// has been provisioned yet.
    pub fn binary_path(&self) -> PathBuf {
        self.cache_dir().join(&self.spec.binary_name)
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_root.join("runtime").join(format!("{}-{}", self.spec.version, self.spec.platform))
    }

    /// Returns a validated interpreter path, downloading and extracting
    /// it first if the cache is empty or stale (spec §4.1).
    pub async fn ensure(&self) -> Result<PathBuf, DownloadError> {
        let binary_path = self.binary_path();

        if validate(&binary_path).await.is_ok() {
            return Ok(binary_path);
        }

        self.download_and_extract(&binary_path).await?;

        validate(&binary_path).await.map_err(|message| DownloadError {
            version: self.spec.version.clone(),
            platform: self.spec.platform.clone(),
            message: format!("binary failed validation after provisioning: {message}"),
        })?;

        Ok(binary_path)
    }

    async fn download_and_extract(&self, binary_path: &Path) -> Result<(), DownloadError> {
        let cache_dir = self.cache_dir();
        tokio::fs::create_dir_all(&cache_dir).await.map_err(|e| self.download_error(e.to_string()))?;

        let archive_path = cache_dir.join(format!("{}.download.tmp", self.spec.binary_name));
        self.stream_to_file(&archive_path).await?;

        let kind = ArchiveKind::from_url(&self.spec.archive_url);
        let entry_name = self.spec.binary_name.clone();
        let extract_dest = cache_dir.join(format!("{}.extract.tmp", self.spec.binary_name));
        let archive_path_owned = archive_path.clone();
        let extract_dest_owned = extract_dest.clone();

        let result = tokio::task::spawn_blocking(move || {
            archive::extract_entry(&archive_path_owned, kind, &entry_name, &extract_dest_owned)
        })
        .await
        .map_err(|e| self.download_error(format!("extraction task panicked: {e}")))?;

        let _ = tokio::fs::remove_file(&archive_path).await;

        result.map_err(|e| self.download_error(format!("failed to extract archive: {e}")))?;

        set_executable(&extract_dest).await.map_err(|e| self.download_error(e.to_string()))?;

        tokio::fs::rename(&extract_dest, binary_path)
            .await
            .map_err(|e| self.download_error(format!("failed to install binary: {e}")))?;

        Ok(())
    }

    async fn stream_to_file(&self, dest: &Path) -> Result<(), DownloadError> {
        let response = reqwest::get(&self.spec.archive_url)
            .await
            .map_err(|e| self.download_error(e.to_string()))?
            .error_for_status()
            .map_err(|e| self.download_error(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| self.download_error(e.to_string()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.download_error(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| self.download_error(e.to_string()))?;
        }
        file.flush().await.map_err(|e| self.download_error(e.to_string()))?;
        Ok(())
    }

    fn download_error(&self, message: String) -> DownloadError {
        DownloadError { version: self.spec.version.clone(), platform: self.spec.platform.clone(), message }
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Validate a cached binary (spec §4.1): file exists, is a regular
/// file, and `<binary> --version` exits 0 within a bounded time.
async fn validate(path: &Path) -> Result<(), String> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
    if !metadata.is_file() {
        return Err("cached path is not a regular file".to_string());
    }

    let mut child = tokio::process::Command::new(path)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| e.to_string())?;

    let status = tokio::time::timeout(VALIDATE_TIMEOUT, child.wait())
        .await
        .map_err(|_| "--version probe timed out".to_string())?
        .map_err(|e| e.to_string())?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("--version probe exited with {status}"))
    }
}

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;
