//! Sequential command execution inside a rootfs

use crate::chroot::runner::ChrootRunner;
use crate::config::schema::EmulationConfig;
use crate::error::{StemmerError, StemmerResult};
use crate::process::output_tail;
use crate::rootfs::RootfsImage;
use std::path::PathBuf;
use tracing::info;

/// Collects shell commands and runs them in order inside one rootfs
///
/// Commands are neither reordered nor deduplicated. The first command
/// that exits non-zero stops the run.
pub struct ChrootExecuter<'a> {
    runner: &'a dyn ChrootRunner,
    root: PathBuf,
    env: Vec<(String, String)>,
    commands: Vec<String>,
}

impl<'a> ChrootExecuter<'a> {
    /// Target `image`, picking up its emulation stub PATH if active
    pub fn new(
        runner: &'a dyn ChrootRunner,
        image: &RootfsImage,
        emulation: &EmulationConfig,
    ) -> StemmerResult<Self> {
        Ok(Self {
            runner,
            root: image.location()?.to_path_buf(),
            env: image.chroot_env(emulation),
            commands: Vec::new(),
        })
    }

    pub fn add_command(&mut self, command: impl Into<String>) -> &mut Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run every command in order, stopping at the first failure
    pub async fn run(&self) -> StemmerResult<()> {
        for command in &self.commands {
            info!("[{}] {}", self.runner.runner_name(), command);

            let output = self.runner.run(&self.root, command, &self.env).await?;
            if !output.success() {
                return Err(StemmerError::command_exec(
                    command.as_str(),
                    output.code,
                    output_tail(output.lines.iter().map(String::as_str)),
                ));
            }
        }
        Ok(())
    }
}
