//! Build command - build and publish a project's rootfs

use crate::build::{Builder, Stage};
use crate::chroot::HostChroot;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::StemmerResult;
use crate::ui::{self, BuildProgress, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> StemmerResult<()> {
    let ctx = UiContext::detect();

    if !running_as_root() {
        ui::step_warn_hint(
            &ctx,
            "Not running as root",
            "chroot and package installation need root privileges",
        );
    }

    let runner = HostChroot::new();
    let progress = BuildProgress::new(&ctx, &args.project);
    let observer = |name: &str, stage: Stage| progress.on_stage(name, stage);
    let builder = Builder::new(config, &runner).with_observer(&observer);

    let result = builder.build_project(&args.project).await;
    progress.finish();
    let report = result?;

    ui::step_ok_detail(
        &ctx,
        &format!("Built {}", args.project),
        &report.rootfs.display().to_string(),
    );

    let record = &report.record;
    ui::key_value(&ctx, "platform", &format!("{} ({})", record.platform, record.arch));
    ui::key_value(&ctx, "installed", &record.installed.len().to_string());
    ui::key_value(&ctx, "from cache", &record.from_cache.len().to_string());
    ui::key_value(
        &ctx,
        "duration",
        &format!("{}s", record.duration().num_seconds()),
    );
    for recipe in &record.dropped_recipes {
        ui::step_warn(&ctx, &format!("Recipe {} was skipped", recipe));
    }

    Ok(())
}

/// `/proc/self` is owned by the effective uid of the running process
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").is_ok_and(|meta| meta.uid() == 0)
}
