//! Project, platform and recipe definitions
//!
//! Definitions are JSON records, one per directory:
//!
//! ```text
//! projects/<name>/project.json
//! platforms/<name>/platform.json
//! recipes/<name>/recipe.json
//! ```

use crate::config::schema::PathsConfig;
use crate::error::{StemmerError, StemmerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Package name to version constraint ("", "*" or an exact version)
pub type PackageMap = BTreeMap<String, String>;

/// What to build: a project, or a derived platform built like one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Platform this rootfs is derived from
    pub platform: Option<String>,

    /// Written to `/etc/hostname` when set
    pub hostname: Option<String>,

    /// Packages installed live
    pub packages: PackageMap,

    /// Recipes supplying cached packages; parameters are opaque
    pub recipes: BTreeMap<String, serde_json::Value>,
}

/// Platform record
///
/// A root platform names its architecture and ships a prebuilt base
/// rootfs. A derived platform names a parent `platform` instead and is
/// built from it with the same fields a project has.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Architecture tag, e.g. "armhf"; inherited when a parent is set
    pub arch: Option<String>,

    /// Base rootfs of a root platform (default `<platforms>/<name>/rootfs`)
    pub rootfs: Option<PathBuf>,

    #[serde(flatten)]
    pub target: ProjectSettings,
}

/// Recipe record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeDefinition {
    /// Packages this recipe is responsible for
    pub packages: PackageMap,
}

/// Loads definition records by name
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    projects_dir: PathBuf,
    platforms_dir: PathBuf,
    recipes_dir: PathBuf,
}

impl DefinitionStore {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            projects_dir: paths.projects_dir(),
            platforms_dir: paths.platforms_dir(),
            recipes_dir: paths.recipes_dir(),
        }
    }

    pub fn platforms_dir(&self) -> &Path {
        &self.platforms_dir
    }

    pub fn recipes_dir(&self) -> &Path {
        &self.recipes_dir
    }

    pub async fn load_project(&self, name: &str) -> StemmerResult<ProjectSettings> {
        let path = record_path(&self.projects_dir, name, "project.json")?;
        read_record(&path)
            .await?
            .ok_or_else(|| StemmerError::ProjectNotFound(name.to_string()))
    }

    pub async fn load_platform(&self, name: &str) -> StemmerResult<PlatformSettings> {
        let path = record_path(&self.platforms_dir, name, "platform.json")?;
        read_record(&path)
            .await?
            .ok_or_else(|| StemmerError::PlatformNotFound(name.to_string()))
    }

    pub async fn load_recipe(&self, name: &str) -> StemmerResult<RecipeDefinition> {
        let path = record_path(&self.recipes_dir, name, "recipe.json")?;
        read_record(&path)
            .await?
            .ok_or_else(|| StemmerError::RecipeNotFound(name.to_string()))
    }

    /// Names of every project that has a `project.json`, sorted
    pub async fn list_projects(&self) -> StemmerResult<Vec<String>> {
        if !self.projects_dir.exists() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        let mut entries = fs::read_dir(&self.projects_dir)
            .await
            .map_err(|e| StemmerError::io("reading projects directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StemmerError::io("reading project entry", e))?
        {
            if entry.path().join("project.json").is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Definition names become directory names; keep them to one component
fn record_path(dir: &Path, name: &str, file: &str) -> StemmerResult<PathBuf> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if !valid {
        return Err(StemmerError::ConfigInvalid {
            path: dir.to_path_buf(),
            reason: format!("invalid definition name {:?}", name),
        });
    }

    Ok(dir.join(name).join(file))
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> StemmerResult<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StemmerError::io(format!("reading {}", path.display()), e));
        }
    };

    debug!("Loaded definition {}", path.display());

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StemmerError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
