//! Per-build context and state
//!
//! `BuildContext` is fixed before the job is acquired and only read by
//! stages. `BuildState` is what the stages produce as they run.

use crate::arch::ArchitectureRef;
use crate::build::record::BuildRecord;
use crate::config::definitions::{PackageMap, ProjectSettings};
use crate::job::BuildJob;
use crate::recipe::{RecipeCache, RecipeOutcome};
use crate::rootfs::RootfsImage;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// What one pipeline run builds
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project or derived platform name; also the publish slot
    pub name: String,
    pub settings: ProjectSettings,
    /// Platform the rootfs is cloned from
    pub platform: ArchitectureRef,
}

impl BuildContext {
    pub fn new(name: impl Into<String>, settings: ProjectSettings, platform: ArchitectureRef) -> Self {
        Self {
            name: name.into(),
            settings,
            platform,
        }
    }

    pub fn arch(&self) -> &str {
        &self.platform.arch
    }
}

/// Everything the stages have produced so far
#[derive(Debug)]
pub struct BuildState {
    pub job: BuildJob,
    pub rootfs: Option<RootfsImage>,
    pub recipes: Vec<RecipeOutcome>,
    /// Packages supplied by recipe caches
    pub cached: BTreeSet<String>,
    pub pending: PackageMap,
    /// Packages installed from the network
    pub installed: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl BuildState {
    pub fn new(job: BuildJob) -> Self {
        Self {
            job,
            rootfs: None,
            recipes: Vec::new(),
            cached: BTreeSet::new(),
            pending: PackageMap::new(),
            installed: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn live_recipes(&self) -> impl Iterator<Item = &RecipeCache> {
        self.recipes.iter().filter_map(|outcome| match outcome {
            RecipeOutcome::Loaded(recipe) => Some(recipe),
            RecipeOutcome::Dropped { .. } => None,
        })
    }

    pub fn live_recipes_mut(&mut self) -> impl Iterator<Item = &mut RecipeCache> {
        self.recipes.iter_mut().filter_map(|outcome| match outcome {
            RecipeOutcome::Loaded(recipe) => Some(recipe),
            RecipeOutcome::Dropped { .. } => None,
        })
    }

    pub fn dropped_recipes(&self) -> Vec<String> {
        self.recipes
            .iter()
            .filter_map(|outcome| match outcome {
                RecipeOutcome::Dropped { name, .. } => Some(name.clone()),
                RecipeOutcome::Loaded(_) => None,
            })
            .collect()
    }

    /// Record of this build, stamped now
    pub fn record(&self, ctx: &BuildContext) -> BuildRecord {
        BuildRecord {
            name: ctx.name.clone(),
            platform: ctx.platform.name.clone(),
            arch: ctx.arch().to_string(),
            hostname: ctx.settings.hostname.clone(),
            packages: self.pending.clone(),
            installed: self.installed.clone(),
            from_cache: self.cached.iter().cloned().collect(),
            recipes: self.live_recipes().map(|r| r.name().to_string()).collect(),
            dropped_recipes: self.dropped_recipes(),
            job: self.job.id(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
