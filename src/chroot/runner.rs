//! Chroot command runner abstraction
//!
//! The pipeline only needs "run this shell command with that directory as
//! `/`". The host implementation spawns `chroot`; tests substitute a
//! recorder so builds can be exercised without root.

use crate::error::{StemmerError, StemmerResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Outcome of one chrooted command
#[derive(Debug, Clone, Default)]
pub struct ChrootOutput {
    /// Exit code, -1 when terminated by a signal
    pub code: i32,
    /// Interleaved stdout and stderr lines
    pub lines: Vec<String>,
}

impl ChrootOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Abstract chroot execution interface
#[async_trait]
pub trait ChrootRunner: Send + Sync {
    /// Run `command` with `/bin/sh -c` inside `root` using exactly `env`
    async fn run(
        &self,
        root: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> StemmerResult<ChrootOutput>;

    /// Human-readable runner name for logs
    fn runner_name(&self) -> &'static str;
}

/// Runs commands through the host `chroot` binary
pub struct HostChroot;

impl HostChroot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostChroot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChrootRunner for HostChroot {
    async fn run(
        &self,
        root: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> StemmerResult<ChrootOutput> {
        debug!("Executing in {}: {}", root.display(), command);

        let mut child = Command::new("chroot")
            .arg(root)
            .args(["/bin/sh", "-c", command])
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StemmerError::command_failed(format!("chroot {}", root.display()), e))?;

        let lines = stream_child_output(&mut child, &|line: &str| debug!("  {}", line)).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| StemmerError::command_failed(format!("chroot {}", root.display()), e))?;

        Ok(ChrootOutput {
            code: status.code().unwrap_or(-1),
            lines,
        })
    }

    fn runner_name(&self) -> &'static str {
        "chroot"
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are decoded lossily: package scripts may print any bytes. A stream
/// that fails to read is closed, so the child sees a broken pipe instead of
/// blocking on a full one.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> StemmerResult<Vec<String>> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(StemmerError::Internal("chroot output not piped".to_string()));
    };

    let mut stdout_reader = Some(BufReader::new(stdout));
    let mut stderr_reader = Some(BufReader::new(stderr));
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let mut all_output = Vec::new();

    while stdout_reader.is_some() || stderr_reader.is_some() {
        tokio::select! {
            read = read_line(&mut stdout_reader, &mut stdout_buf), if stdout_reader.is_some() => {
                if !take_line(read, &mut stdout_buf, &mut all_output, on_output) {
                    stdout_reader = None;
                }
            }
            read = read_line(&mut stderr_reader, &mut stderr_buf), if stderr_reader.is_some() => {
                if !take_line(read, &mut stderr_buf, &mut all_output, on_output) {
                    stderr_reader = None;
                }
            }
        }
    }

    Ok(all_output)
}

/// Append the next line of `reader` to `buf`; a closed reader is at EOF
async fn read_line<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => Ok(0),
    }
}

/// Emit the line in `buf`, returning whether the stream is still open
fn take_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    all_output: &mut Vec<String>,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> bool {
    match read {
        Ok(0) => false,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            buf.clear();
            on_output(&line);
            all_output.push(line);
            true
        }
        Err(e) => {
            warn!("Could not read command output: {}", e);
            false
        }
    }
}
