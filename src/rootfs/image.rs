//! Rootfs lifecycle: clone, move, remove

use crate::arch::{host_arch, Emulation};
use crate::error::{StemmerError, StemmerResult};
use crate::process;
use crate::rootfs::PACKAGE_STAGING_DIR;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// One rootfs directory
#[derive(Debug)]
pub struct RootfsImage {
    pub(super) arch: String,
    pub(super) host: String,
    pub(super) path: Option<PathBuf>,
    pub(super) active_emulation: Option<Emulation>,
}

impl RootfsImage {
    /// Bind an image of `arch` to `path`
    pub fn new(arch: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            arch: arch.into(),
            host: host_arch().to_string(),
            path: Some(path.into()),
            active_emulation: None,
        }
    }

    /// An image with no location yet
    pub fn unbound(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            host: host_arch().to_string(),
            path: None,
            active_emulation: None,
        }
    }

    /// Pretend to run on a different host architecture
    pub fn with_host_arch(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn host_arch(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bound location, or `RootfsNotFound` for an unbound image
    pub fn location(&self) -> StemmerResult<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| StemmerError::RootfsNotFound(PathBuf::new()))
    }

    /// Package staging directory inside this rootfs
    pub fn staging_dir(&self) -> StemmerResult<PathBuf> {
        Ok(self.location()?.join(PACKAGE_STAGING_DIR))
    }

    /// Whether the location exists and holds at least one entry
    pub async fn has_contents(&self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        match fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// Copy this rootfs into `target`, returning an independent image
    ///
    /// The source must exist and hold at least one entry. Entries are
    /// copied with `cp -a`, so permissions, owners and symlinks survive.
    pub async fn clone_to(&self, target: &Path) -> StemmerResult<RootfsImage> {
        let source = self.existing_location().await?;

        fs::create_dir_all(target)
            .await
            .map_err(|e| StemmerError::DirCreate {
                path: target.to_path_buf(),
                source: e,
            })?;

        let entries = process::list_entries(source).await?;
        if entries.is_empty() {
            return Err(StemmerError::RootfsNotFound(source.to_path_buf()));
        }

        info!("Cloning rootfs {} -> {}", source.display(), target.display());
        process::copy_archive(&entries, target).await?;

        Ok(RootfsImage {
            arch: self.arch.clone(),
            host: self.host.clone(),
            path: Some(target.to_path_buf()),
            active_emulation: None,
        })
    }

    /// Rename every entry of this rootfs into `target` and rebind to it
    ///
    /// An empty rootfs moves nothing but is still rebound.
    pub async fn move_to(&mut self, target: &Path) -> StemmerResult<()> {
        let source = self.existing_location().await?.to_path_buf();
        let entries = process::list_entries(&source).await?;

        if entries.is_empty() {
            debug!("Rootfs {} is empty, nothing to move", source.display());
        } else {
            fs::create_dir_all(target)
                .await
                .map_err(|e| StemmerError::DirCreate {
                    path: target.to_path_buf(),
                    source: e,
                })?;

            info!("Moving rootfs {} -> {}", source.display(), target.display());
            process::move_entries(&entries, target).await?;
        }

        self.path = Some(target.to_path_buf());
        Ok(())
    }

    /// Delete the rootfs directory; an unbound image has nothing to delete
    pub async fn remove(&mut self) -> StemmerResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        info!("Removing rootfs {}", path.display());
        process::remove_tree(path).await?;
        self.active_emulation = None;
        Ok(())
    }

    async fn existing_location(&self) -> StemmerResult<&Path> {
        let path = self.location()?;
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(StemmerError::RootfsNotFound(path.to_path_buf())),
        }
    }
}
