//! Build progress with CI fallback

use super::context::UiContext;
use crate::build::Stage;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress of a build pipeline, one tick per stage
///
/// A derived platform built on demand restarts the bar under its own
/// name before the project continues.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(Stage::PIPELINE.len() as u64);
            if let Ok(bar_style) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(
                    bar_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", label);
            None
        };
        Self { bar }
    }

    /// Stage observer hook
    ///
    /// `Stage::Release` comes after the pipeline and keeps the bar full.
    pub fn on_stage(&self, name: &str, stage: Stage) {
        let total = Stage::PIPELINE.len() as u64;
        let position = Stage::PIPELINE
            .iter()
            .position(|s| *s == stage)
            .map_or(total, |i| i as u64 + 1);

        match &self.bar {
            Some(bar) => {
                bar.set_prefix(name.to_string());
                bar.set_position(position);
                bar.set_message(stage.to_string());
            }
            None => println!(
                "  {} {} {}",
                style(format!("[{}/{}]", position, Stage::PIPELINE.len())).dim(),
                name,
                stage
            ),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
