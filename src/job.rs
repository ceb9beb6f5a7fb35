//! Build jobs
//!
//! A job owns one private working directory under the jobs root for the
//! duration of a build attempt. Directory names are random UUIDs and are
//! created with a non-recursive `mkdir`, so two jobs can never share one.

use crate::error::{StemmerError, StemmerResult};
use crate::process;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// An exclusively owned build working directory
#[derive(Debug)]
pub struct BuildJob {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl BuildJob {
    /// Create a fresh, empty working directory under `jobs_dir`
    pub async fn acquire(jobs_dir: &Path) -> StemmerResult<Self> {
        fs::create_dir_all(jobs_dir)
            .await
            .map_err(|e| StemmerError::JobCreate {
                path: jobs_dir.to_path_buf(),
                source: e,
            })?;

        let id = Uuid::new_v4();
        let path = jobs_dir.join(id.to_string());

        // create_dir fails on an existing path, which keeps the directory ours
        fs::create_dir(&path)
            .await
            .map_err(|e| StemmerError::JobCreate {
                path: path.clone(),
                source: e,
            })?;

        debug!("Acquired job {} at {}", id, path.display());
        Ok(Self {
            id,
            path,
            released: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Working directory of this job
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where this job assembles its rootfs
    pub fn rootfs_path(&self) -> PathBuf {
        self.path.join("rootfs")
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the working directory and everything in it
    ///
    /// Calling this again after a successful release does nothing.
    pub async fn release(&mut self) -> StemmerResult<()> {
        if self.released {
            return Ok(());
        }

        process::remove_tree(&self.path).await?;
        self.released = true;
        debug!("Released job {}", self.id);
        Ok(())
    }
}

impl Drop for BuildJob {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Job {} dropped without release; {} left on disk",
                self.id,
                self.path.display()
            );
        }
    }
}
