//! Build orchestration
//!
//! A build runs a fixed sequence of [`Stage`]s against one [`BuildJob`].
//! The first failing stage stops the sequence. Clearing the emulation
//! environment and releasing the job are cleanup obligations that run on
//! every exit path, so a failed build leaves neither host files nor a
//! half-built rootfs behind, and never touches the previously published
//! rootfs.

pub mod context;
pub mod packages;
pub mod record;

pub use context::{BuildContext, BuildState};
pub use record::BuildRecord;

use crate::arch::{host_arch, ArchitectureRef, PlatformBase};
use crate::chroot::{ChrootExecuter, ChrootRunner};
use crate::config::{Config, DefinitionStore};
use crate::error::{StemmerError, StemmerResult};
use crate::job::BuildJob;
use crate::process;
use crate::recipe::{RecipeCache, RecipeOutcome};
use crate::rootfs::{RootfsImage, STAGING_ROOT};
use futures_util::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Published rootfs directory name inside a project's build slot
const PUBLISHED_ROOTFS: &str = "rootfs";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DeriveBase,
    WriteHostname,
    PrepareEnvironment,
    StageRecipes,
    ApplyStaged,
    InstallPackages,
    ClearEnvironment,
    DiscardPrevious,
    Publish,
    /// Reported once cleanup is done, just before the job is released;
    /// runs on every exit path and is not part of [`Stage::PIPELINE`]
    Release,
}

impl Stage {
    pub const PIPELINE: [Stage; 9] = [
        Stage::DeriveBase,
        Stage::WriteHostname,
        Stage::PrepareEnvironment,
        Stage::StageRecipes,
        Stage::ApplyStaged,
        Stage::InstallPackages,
        Stage::ClearEnvironment,
        Stage::DiscardPrevious,
        Stage::Publish,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DeriveBase => "deriving base rootfs",
            Stage::WriteHostname => "writing hostname",
            Stage::PrepareEnvironment => "preparing emulation",
            Stage::StageRecipes => "staging recipe caches",
            Stage::ApplyStaged => "applying staged packages",
            Stage::InstallPackages => "installing packages",
            Stage::ClearEnvironment => "clearing emulation",
            Stage::DiscardPrevious => "discarding previous rootfs",
            Stage::Publish => "publishing",
            Stage::Release => "releasing job",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful build
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Published rootfs location
    pub rootfs: PathBuf,
    pub record: BuildRecord,
}

/// Stage observer, called with the build name as each stage starts and
/// with [`Stage::Release`] once cleanup is done
pub type StageObserver<'a> = dyn Fn(&str, Stage) + Send + Sync + 'a;

/// Runs build pipelines for projects and derived platforms
pub struct Builder<'a> {
    config: &'a Config,
    store: DefinitionStore,
    runner: &'a dyn ChrootRunner,
    host_arch: String,
    observer: Option<&'a StageObserver<'a>>,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn ChrootRunner) -> Self {
        Self {
            config,
            store: DefinitionStore::new(&config.paths),
            runner,
            host_arch: host_arch().to_string(),
            observer: None,
        }
    }

    /// Decide emulation as if running on `host`
    pub fn with_host_arch(mut self, host: impl Into<String>) -> Self {
        self.host_arch = host.into();
        self
    }

    pub fn with_observer(mut self, observer: &'a StageObserver<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&self, name: &str, stage: Stage) {
        if let Some(observer) = self.observer {
            observer(name, stage);
        }
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    /// Publish slot for `name`: the rootfs and its build record
    pub fn publish_dir(&self, name: &str) -> PathBuf {
        self.config.paths.build_dir().join(name)
    }

    pub fn published_rootfs_path(&self, name: &str) -> PathBuf {
        self.publish_dir(name).join(PUBLISHED_ROOTFS)
    }

    /// Build project `name` and publish its rootfs
    pub async fn build_project(&self, name: &str) -> StemmerResult<BuildReport> {
        let settings = self.store.load_project(name).await?;
        let platform_name = settings
            .platform
            .clone()
            .ok_or_else(|| StemmerError::MissingField {
                target: format!("project {}", name),
                field: "platform".to_string(),
            })?;

        let platform = ArchitectureRef::resolve(&self.store, &platform_name).await?;
        debug!(
            "Project {} targets platform {} ({})",
            name, platform.name, platform.arch
        );

        self.run(BuildContext::new(name, settings, platform)).await
    }

    /// Remove the published rootfs and build record of `name`
    ///
    /// Returns whether anything was published.
    pub async fn discard(&self, name: &str) -> StemmerResult<bool> {
        let dir = self.publish_dir(name);
        if fs::metadata(&dir).await.is_err() {
            return Ok(false);
        }

        info!("Discarding published build {}", dir.display());
        process::remove_tree(&dir).await?;
        Ok(true)
    }

    fn image(&self, arch: &str, path: impl Into<PathBuf>) -> RootfsImage {
        RootfsImage::new(arch, path).with_host_arch(self.host_arch.as_str())
    }

    /// Run the pipeline for `ctx` inside a fresh job
    fn run(&self, ctx: BuildContext) -> BoxFuture<'_, StemmerResult<BuildReport>> {
        Box::pin(async move {
            info!("Building {} for {}", ctx.name, ctx.arch());

            let job = BuildJob::acquire(&self.config.paths.jobs_dir()).await?;
            debug!("Job {} at {}", job.id(), job.path().display());
            let mut state = BuildState::new(job);

            let result = self.run_stages(&ctx, &mut state).await;
            self.finish(&ctx, &mut state, result.is_ok()).await;

            let record = result?;
            info!(
                "Built {} in {}s",
                ctx.name,
                record.duration().num_seconds()
            );
            Ok(BuildReport {
                rootfs: self.published_rootfs_path(&ctx.name),
                record,
            })
        })
    }

    async fn run_stages(
        &self,
        ctx: &BuildContext,
        state: &mut BuildState,
    ) -> StemmerResult<BuildRecord> {
        for stage in Stage::PIPELINE {
            self.notify(&ctx.name, stage);
            debug!("{}: {}", ctx.name, stage);

            if let Err(e) = self.run_stage(stage, ctx, state).await {
                warn!("{}: {} failed: {}", ctx.name, stage, e);
                return Err(e);
            }
        }

        let record = state.record(ctx);
        if let Err(e) = record.save(&self.publish_dir(&ctx.name)).await {
            warn!("Could not write build record for {}: {}", ctx.name, e);
        }
        Ok(record)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        ctx: &BuildContext,
        state: &mut BuildState,
    ) -> StemmerResult<()> {
        match stage {
            Stage::DeriveBase => self.derive_base(ctx, state).await,
            Stage::WriteHostname => {
                self.write_hostname(ctx, state).await;
                Ok(())
            }
            Stage::PrepareEnvironment => {
                active_rootfs(state)?
                    .prepare_environment(&self.config.emulation)
                    .await
            }
            Stage::StageRecipes => self.stage_recipes(ctx, state).await,
            Stage::ApplyStaged => self.apply_staged(state).await,
            Stage::InstallPackages => self.install_packages(state).await,
            Stage::ClearEnvironment => {
                let rootfs = active_rootfs(state)?;
                process::remove_tree(&rootfs.location()?.join(STAGING_ROOT)).await?;
                rootfs.clear_environment(&self.config.emulation).await
            }
            Stage::DiscardPrevious => {
                let previous = self.published_rootfs_path(&ctx.name);
                if fs::metadata(&previous).await.is_ok() {
                    self.image(ctx.arch(), previous).remove().await?;
                }
                Ok(())
            }
            Stage::Publish => {
                let target = self.published_rootfs_path(&ctx.name);
                process::make_dirs(&target).await?;
                active_rootfs(state)?.move_to(&target).await
            }
            // done by finish()
            Stage::Release => Ok(()),
        }
    }

    /// Clear the environment and release the job, whatever happened
    async fn finish(&self, ctx: &BuildContext, state: &mut BuildState, succeeded: bool) {
        if let Some(rootfs) = state.rootfs.as_mut() {
            if let Err(e) = rootfs.clear_environment(&self.config.emulation).await {
                warn!("{}: could not clear emulation environment: {}", ctx.name, e);
            }
        }

        self.notify(&ctx.name, Stage::Release);
        if let Err(e) = state.job.release().await {
            warn!("{}: could not release job {}: {}", ctx.name, state.job.id(), e);
        } else if !succeeded {
            debug!("{}: discarded job {}", ctx.name, state.job.id());
        }
    }

    async fn derive_base(&self, ctx: &BuildContext, state: &mut BuildState) -> StemmerResult<()> {
        let base = self.platform_rootfs(&ctx.platform).await?;
        let rootfs = base.clone_to(&state.job.rootfs_path()).await?;
        state.rootfs = Some(rootfs);
        Ok(())
    }

    /// Rootfs to clone for `platform`, building a derived platform first
    /// if it has not been published yet
    async fn platform_rootfs(&self, platform: &ArchitectureRef) -> StemmerResult<RootfsImage> {
        match &platform.base {
            PlatformBase::Image(path) => Ok(self.image(&platform.arch, path.clone())),
            PlatformBase::Derived { parent, settings } => {
                let published = self.image(&platform.arch, self.published_rootfs_path(&platform.name));
                if published.has_contents().await {
                    debug!("Using published platform {}", platform.name);
                    return Ok(published);
                }

                info!("Platform {} is not built yet, building it first", platform.name);
                let parent_ctx =
                    BuildContext::new(platform.name.as_str(), settings.clone(), (**parent).clone());
                let report = self.run(parent_ctx).await?;
                Ok(self.image(&platform.arch, report.rootfs))
            }
        }
    }

    async fn write_hostname(&self, ctx: &BuildContext, state: &BuildState) {
        let Some(hostname) = ctx.settings.hostname.as_deref() else {
            return;
        };
        let Some(root) = state.rootfs.as_ref().and_then(|r| r.path()) else {
            return;
        };

        let path = root.join("etc/hostname");
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir).await;
        }
        match fs::write(&path, format!("{}\n", hostname)).await {
            Ok(()) => debug!("Hostname set to {}", hostname),
            Err(e) => warn!("Could not write {}: {}", path.display(), e),
        }
    }

    /// Load the configured recipes, settle the pending package set and
    /// stage every cached archive that satisfies it
    async fn stage_recipes(&self, ctx: &BuildContext, state: &mut BuildState) -> StemmerResult<()> {
        for name in ctx.settings.recipes.keys() {
            let outcome = RecipeCache::try_init(&self.store, name, ctx.arch()).await;
            if let RecipeOutcome::Dropped { name, error } = &outcome {
                warn!("Skipping recipe {}: {}", name, error);
            }
            state.recipes.push(outcome);
        }
        state.pending = packages::merge(state.live_recipes(), &ctx.settings.packages)?;

        let staging = active_rootfs(state)?.staging_dir()?;
        let mut cached = BTreeSet::new();
        for recipe in state.live_recipes() {
            cached.extend(recipe.materialize(&staging, &state.pending).await?);
        }
        state.cached = cached;
        Ok(())
    }

    async fn apply_staged(&self, state: &mut BuildState) -> StemmerResult<()> {
        let rootfs = active_rootfs(state)?;
        let staging = rootfs.staging_dir()?;
        if !has_archives(&staging).await? {
            debug!("No staged packages");
            return Ok(());
        }

        let mut executer = ChrootExecuter::new(self.runner, rootfs, &self.config.emulation)?;
        executer.add_command(packages::apply_staged_command());
        executer.run().await
    }

    /// Install cache misses from the network
    ///
    /// Archives applied from recipe caches were unpacked without their
    /// dependencies, so apt runs whenever anything was staged, even with
    /// no package of its own to fetch.
    async fn install_packages(&self, state: &mut BuildState) -> StemmerResult<()> {
        let live = packages::cache_misses(&state.pending, &state.cached);
        if live.is_empty() && state.cached.is_empty() {
            debug!("Nothing to install");
            return Ok(());
        }

        let rootfs = active_rootfs(state)?;
        let staging = rootfs.staging_dir()?;
        process::make_dirs(&staging.join("partial")).await?;

        let mut executer = ChrootExecuter::new(self.runner, rootfs, &self.config.emulation)?;
        for command in packages::install_commands(&live) {
            executer.add_command(command);
        }
        executer.run().await?;

        if live.is_empty() {
            info!("Resolved dependencies of {} cached packages", state.cached.len());
        } else {
            info!("Installed {} packages", live.len());
        }
        state.installed = live.into_keys().collect();

        for recipe in state.live_recipes_mut() {
            if let Err(e) = recipe.snapshot(&staging).await {
                warn!("Recipe {}: could not update cache: {}", recipe.name(), e);
            }
        }
        Ok(())
    }
}

fn active_rootfs(state: &mut BuildState) -> StemmerResult<&mut RootfsImage> {
    state
        .rootfs
        .as_mut()
        .ok_or_else(|| StemmerError::Internal("no rootfs derived for this build".to_string()))
}

async fn has_archives(dir: &Path) -> StemmerResult<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let entries = process::list_entries(dir).await?;
    Ok(entries
        .iter()
        .any(|p| p.extension().is_some_and(|ext| ext == "deb")))
}
