//! On-disk index of a recipe cache
//!
//! `index.json` maps package names to artifact files stored next to it.
//! Entries are only ever added.

use crate::error::{StemmerError, StemmerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

pub const INDEX_FILE: &str = "index.json";

/// One cached package artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Artifact file name inside the cache directory
    pub file: String,

    /// Package version, taken from the archive name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// When the artifact was cached
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(file: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            version: archive_version(&file),
            file,
            cached_at: Utc::now(),
        }
    }

    /// Whether this artifact can stand in for `constraint`
    ///
    /// Any version satisfies `*` or an empty constraint. A pinned version
    /// must match exactly; an entry of unknown version never does.
    pub fn satisfies(&self, constraint: &str) -> bool {
        match constraint {
            "" | "*" => true,
            pinned => self.version.as_deref() == Some(pinned),
        }
    }
}

/// Version part of a `<package>_<version>_<arch>.deb` file name
///
/// apt escapes the epoch colon as `%3a`.
fn archive_version(file: &str) -> Option<String> {
    let stem = file.strip_suffix(".deb")?;
    let mut parts = stem.splitn(3, '_');
    let (_, version, _) = (parts.next()?, parts.next()?, parts.next()?);
    if version.is_empty() {
        return None;
    }
    Some(version.replace("%3a", ":"))
}

/// Package name to cached artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    /// Load the index in `dir`; no index file means an empty cache
    pub async fn load(dir: &Path) -> StemmerResult<Self> {
        let path = dir.join(INDEX_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StemmerError::io(format!("reading {}", path.display()), e)),
        };

        serde_json::from_str(&content).map_err(|e| StemmerError::ConfigInvalid {
            path,
            reason: e.to_string(),
        })
    }

    /// Write the index to `dir` via a temporary file and rename
    pub async fn save(&self, dir: &Path) -> StemmerResult<()> {
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!(".{}.tmp", INDEX_FILE));

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, content)
            .await
            .map_err(|e| StemmerError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StemmerError::io(format!("replacing {}", path.display()), e))?;
        Ok(())
    }

    /// Add an entry unless the package is already cached
    pub fn insert(&mut self, package: &str, entry: CacheEntry) -> bool {
        if self.entries.contains_key(package) {
            return false;
        }
        self.entries.insert(package.to_string(), entry);
        true
    }
}
