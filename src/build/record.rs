//! Build records
//!
//! A successful publish leaves `build.json` next to the published rootfs.

use crate::config::definitions::PackageMap;
use crate::error::{StemmerError, StemmerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

pub const RECORD_FILE: &str = "build.json";

/// What went into a published rootfs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub name: String,
    pub platform: String,
    pub arch: String,
    pub hostname: Option<String>,

    /// Every requested package with its constraint
    pub packages: PackageMap,

    /// Packages installed from the network
    pub installed: Vec<String>,

    /// Packages installed from recipe caches
    pub from_cache: Vec<String>,

    /// Recipes that took part in the build
    pub recipes: Vec<String>,

    /// Recipes that failed to load and were skipped
    pub dropped_recipes: Vec<String>,

    pub job: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildRecord {
    pub async fn load(dir: &Path) -> StemmerResult<Option<Self>> {
        let path = dir.join(RECORD_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StemmerError::io(format!("reading {}", path.display()), e)),
        }
    }

    pub async fn save(&self, dir: &Path) -> StemmerResult<()> {
        let path = dir.join(RECORD_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StemmerError::io(format!("writing {}", path.display()), e))
    }

    /// Wall-clock build time
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
