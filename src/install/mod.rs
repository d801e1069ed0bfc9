//! Install and update orchestration
//!
//! Resolves a release, picks the asset for the host platform, stages the
//! download next to the final binary, and only then replaces the binary and
//! extends PATH.

pub mod github;

use crate::platform::{select_platform_asset, Platform, PlatformPolicy};
use crate::types::{InstallAction, InstallOutcome};
use github::{ReleaseError, ReleaseSource};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// A hard failure of `install_or_update`. Every variant aborts the remaining
/// steps; PATH problems are reported on the outcome instead.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Could not fetch release {tag}: {source}")]
    Network {
        tag: String,
        #[source]
        source: ReleaseError,
    },
    #[error("No compatible binary found for {platform} in release {tag}")]
    NoCompatibleAsset { tag: String, platform: Platform },
    #[error("Download of {asset} failed: {source}")]
    Download {
        asset: String,
        #[source]
        source: ReleaseError,
    },
    #[error("Could not make {} executable: {source}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not write {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Installer<S> {
    source: S,
    policy: Box<dyn PlatformPolicy>,
    home: PathBuf,
}

impl<S: ReleaseSource> Installer<S> {
    pub fn new(source: S, policy: Box<dyn PlatformPolicy>, home: impl Into<PathBuf>) -> Self {
        Self {
            source,
            policy,
            home: home.into(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.policy.platform()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.policy.install_dir(&self.home)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.policy.install_path(&self.home)
    }

    pub fn is_installed(&self) -> bool {
        self.policy.is_executable(&self.binary_path())
    }

    pub async fn install_or_update(&self, tag: &str) -> Result<InstallOutcome, InstallError> {
        let assets = self
            .source
            .get_release(tag)
            .await
            .map_err(|source| InstallError::Network {
                tag: tag.to_string(),
                source,
            })?;

        let asset = select_platform_asset(&assets, self.platform())
            .cloned()
            .ok_or_else(|| InstallError::NoCompatibleAsset {
                tag: tag.to_string(),
                platform: self.platform(),
            })?;

        let install_dir = self.install_dir();
        let binary_path = self.binary_path();
        let action = if binary_path.exists() {
            InstallAction::Updated
        } else {
            InstallAction::Installed
        };
        tracing::debug!("Install target: {}", binary_path.display());

        fs::create_dir_all(&install_dir).map_err(|source| InstallError::Filesystem {
            path: install_dir.clone(),
            source,
        })?;

        // Staged in the install directory so the final rename stays on one filesystem
        let mut staged =
            NamedTempFile::new_in(&install_dir).map_err(|source| InstallError::Filesystem {
                path: install_dir.clone(),
                source,
            })?;

        let bytes_written = self
            .source
            .download(&asset, staged.as_file_mut())
            .await
            .map_err(|source| InstallError::Download {
                asset: asset.name.clone(),
                source,
            })?;

        self.policy
            .apply_executable_bit(staged.path())
            .map_err(|source| InstallError::Permission {
                path: binary_path.clone(),
                source,
            })?;

        staged
            .persist(&binary_path)
            .map_err(|e| InstallError::Filesystem {
                path: binary_path.clone(),
                source: e.error,
            })?;
        tracing::info!("Commitify {} {} at {}", tag, action, binary_path.display());

        let path_update = self.ensure_path_entry(&install_dir);

        Ok(InstallOutcome {
            action,
            tag: tag.to_string(),
            asset,
            binary_path,
            bytes_written,
            path_update,
        })
    }

    fn ensure_path_entry(&self, install_dir: &Path) -> crate::path_update::PathUpdateReport {
        self.policy.ensure_path_entry(&self.home, install_dir)
    }
}
