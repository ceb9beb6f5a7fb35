//! Recipe package caches
//!
//! A recipe names a set of packages. Once those packages have been
//! installed in some build, their `.deb` archives are kept under
//! `<recipes>/<name>/cache/<arch>/` so later builds for the same
//! architecture can install them from disk instead of the network.
//!
//! # Lifecycle
//!
//! | Step          | Effect                                              |
//! |---------------|-----------------------------------------------------|
//! | `init`        | load recipe definition and cache index              |
//! | `materialize` | copy usable cached archives into a staging dir      |
//! | `snapshot`    | store archives of newly installed packages in cache |

pub mod index;

pub use index::{CacheEntry, CacheIndex};

use crate::config::definitions::{DefinitionStore, PackageMap};
use crate::error::{StemmerError, StemmerResult};
use crate::process;
use futures_util::future::try_join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// A loaded recipe and its cache for one architecture
#[derive(Debug, Clone)]
pub struct RecipeCache {
    name: String,
    arch: String,
    packages: PackageMap,
    cache_dir: PathBuf,
    index: CacheIndex,
}

/// Result of initializing one configured recipe
#[derive(Debug)]
pub enum RecipeOutcome {
    /// The recipe is live and takes part in the build
    Loaded(RecipeCache),
    /// The recipe could not be loaded and contributes nothing
    Dropped { name: String, error: StemmerError },
}

impl RecipeCache {
    /// Load recipe `name` and its cache for `arch`
    pub async fn init(store: &DefinitionStore, name: &str, arch: &str) -> StemmerResult<Self> {
        let definition = store.load_recipe(name).await?;
        let cache_dir = store.recipes_dir().join(name).join("cache").join(arch);
        let mut index = CacheIndex::load(&cache_dir).await?;

        // entries whose archive disappeared count as not cached
        index.entries.retain(|package, entry| {
            let present = cache_dir.join(&entry.file).is_file();
            if !present {
                warn!("Recipe {}: cached archive for {} is missing", name, package);
            }
            present
        });

        debug!(
            "Recipe {} ({}): {} packages, {} cached",
            name,
            arch,
            definition.packages.len(),
            index.entries.len()
        );

        Ok(Self {
            name: name.to_string(),
            arch: arch.to_string(),
            packages: definition.packages,
            cache_dir,
            index,
        })
    }

    /// Initialize, turning any failure into a `Dropped` outcome
    pub async fn try_init(store: &DefinitionStore, name: &str, arch: &str) -> RecipeOutcome {
        match Self::init(store, name, arch).await {
            Ok(recipe) => RecipeOutcome::Loaded(recipe),
            Err(error) => RecipeOutcome::Dropped {
                name: name.to_string(),
                error,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Packages this recipe is responsible for
    pub fn packages(&self) -> &PackageMap {
        &self.packages
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn is_cached(&self, package: &str) -> bool {
        self.index.entries.contains_key(package)
    }

    /// Package name to cached archive path
    pub fn cached_artifacts(&self) -> BTreeMap<String, PathBuf> {
        self.index
            .entries
            .iter()
            .map(|(package, entry)| (package.clone(), self.cache_dir.join(&entry.file)))
            .collect()
    }

    /// Cached archives that satisfy the constraints in `wanted`
    ///
    /// A package missing from `wanted`, or cached at a version other than
    /// the one pinned there, is left for apt.
    pub fn usable_artifacts(&self, wanted: &PackageMap) -> BTreeMap<String, PathBuf> {
        self.index
            .entries
            .iter()
            .filter(|(package, entry)| match wanted.get(*package) {
                Some(constraint) if entry.satisfies(constraint) => true,
                Some(constraint) => {
                    debug!(
                        "Recipe {}: cached {} {} does not satisfy {}",
                        self.name,
                        package,
                        entry.version.as_deref().unwrap_or("(unknown)"),
                        constraint
                    );
                    false
                }
                None => false,
            })
            .map(|(package, entry)| (package.clone(), self.cache_dir.join(&entry.file)))
            .collect()
    }

    /// Copy the usable cached archives into `target`, returning the
    /// packages they supply
    pub async fn materialize(
        &self,
        target: &Path,
        wanted: &PackageMap,
    ) -> StemmerResult<Vec<String>> {
        let artifacts = self.usable_artifacts(wanted);
        if artifacts.is_empty() {
            return Ok(vec![]);
        }

        fs::create_dir_all(target)
            .await
            .map_err(|e| StemmerError::DirCreate {
                path: target.to_path_buf(),
                source: e,
            })?;

        try_join_all(
            artifacts
                .values()
                .map(|artifact| process::copy_archive(std::slice::from_ref(artifact), target)),
        )
        .await?;

        info!(
            "Recipe {}: staged {} cached packages",
            self.name,
            artifacts.len()
        );
        Ok(artifacts.into_keys().collect())
    }

    /// Store archives of this recipe's not-yet-cached packages found in
    /// `staging`, returning the packages that were added
    pub async fn snapshot(&mut self, staging: &Path) -> StemmerResult<Vec<String>> {
        let missing: Vec<&String> = self
            .packages
            .keys()
            .filter(|p| !self.is_cached(p))
            .collect();
        if missing.is_empty() || !staging.is_dir() {
            return Ok(vec![]);
        }

        let archives = process::list_entries(staging).await?;
        let mut found: Vec<(String, PathBuf)> = Vec::new();
        for package in missing {
            match find_archive(&archives, package) {
                Some(archive) => found.push((package.clone(), archive.clone())),
                None => debug!("Recipe {}: no archive for {} in staging", self.name, package),
            }
        }
        if found.is_empty() {
            return Ok(vec![]);
        }

        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| StemmerError::DirCreate {
                path: self.cache_dir.clone(),
                source: e,
            })?;

        let sources: Vec<PathBuf> = found.iter().map(|(_, archive)| archive.clone()).collect();
        process::copy_archive(&sources, &self.cache_dir).await?;

        let mut added = Vec::new();
        for (package, archive) in found {
            let Some(file) = archive.file_name() else {
                continue;
            };
            if self
                .index
                .insert(&package, CacheEntry::new(file.to_string_lossy()))
            {
                added.push(package);
            }
        }

        self.index.save(&self.cache_dir).await?;
        info!("Recipe {}: cached {}", self.name, added.join(", "));
        Ok(added)
    }
}

/// Pick the `<package>_<version>_<arch>.deb` archive for `package`
///
/// When several versions are present the last one in sort order wins.
fn find_archive<'a>(archives: &'a [PathBuf], package: &str) -> Option<&'a PathBuf> {
    let prefix = format!("{}_", package);
    archives
        .iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".deb"))
        })
        .max()
}
