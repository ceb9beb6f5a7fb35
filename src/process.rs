//! Host command execution
//!
//! Every external program stemmer runs on the host (archival copy, move,
//! recursive delete, directory creation) goes through [`Cmd`], so a
//! non-zero exit always surfaces as `StemmerError::CommandExecution`.

use crate::error::{StemmerError, StemmerResult};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines kept in command error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Keep the useful tail of a command's output for error diagnostics.
pub(crate) fn output_tail<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.into_iter().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Captured result of a successful command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A host command
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Command line as shown in logs and errors
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, failing on a non-zero exit
    pub async fn run(self) -> StemmerResult<CommandOutput> {
        let shown = self.display();
        debug!("Executing: {}", shown);

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StemmerError::command_failed(&shown, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(StemmerError::command_exec(
                shown,
                output.status.code().unwrap_or(-1),
                output_tail(stdout.lines().chain(stderr.lines())),
            ))
        }
    }
}

/// `cp -a` every source into `target`, preserving modes, owners and links
pub async fn copy_archive(sources: &[PathBuf], target: &Path) -> StemmerResult<()> {
    if sources.is_empty() {
        return Ok(());
    }
    Cmd::new("cp").arg("-a").args(sources).arg(target).run().await?;
    Ok(())
}

/// `mv -f` every source into `target` (rename, not copy)
pub async fn move_entries(sources: &[PathBuf], target: &Path) -> StemmerResult<()> {
    if sources.is_empty() {
        return Ok(());
    }
    Cmd::new("mv").arg("-f").args(sources).arg(target).run().await?;
    Ok(())
}

/// `rm -fr path`; a missing path is not an error
pub async fn remove_tree(path: &Path) -> StemmerResult<()> {
    Cmd::new("rm").arg("-fr").arg(path).run().await?;
    Ok(())
}

/// `mkdir -p path`, reported as a resource failure
pub async fn make_dirs(path: &Path) -> StemmerResult<()> {
    Cmd::new("mkdir")
        .arg("-p")
        .arg(path)
        .run()
        .await
        .map(|_| ())
        .map_err(|e| StemmerError::DirCreate {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })
}

/// Full paths of the top-level entries of `dir`, sorted
pub async fn list_entries(dir: &Path) -> StemmerResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StemmerError::io(format!("reading {}", dir.display()), e))?;

    let mut paths = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StemmerError::io(format!("reading entry of {}", dir.display()), e))?
    {
        paths.push(entry.path());
    }

    paths.sort();
    Ok(paths)
}
