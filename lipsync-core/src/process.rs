//! Bounded execution of external tools

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Result};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// A configured external program: executable plus fixed leading arguments
/// and environment overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    /// Splits a shell-style command line such as `python3 -m edge_tts`.
    pub fn parse(command: &str) -> Result<Self> {
        let parts = shell_words::split(command)
            .map_err(|e| anyhow!("Failed to parse command: {e:?}"))?;
        let Some((program, args)) = parts.split_first() else {
            return Err(anyhow!("Empty command"));
        };
        Ok(Self {
            program: PathBuf::from(program),
            args: args.to_vec(),
            env: HashMap::new(),
        })
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Short tool name for messages; never the full path.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "tool".to_string())
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ProcessOutput {
    /// Exit code, or a description of the terminating signal.
    pub fn status_label(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{tool} is missing or not executable")]
    Missing {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("failed waiting for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs `spec` with extra trailing `args`, capturing stdout and stderr.
///
/// On unix the tool gets its own process group, and the whole group is
/// killed once the tool exits, when `timeout` elapses, or when the calling
/// future is dropped. Helpers the tool started cannot outlive it, and
/// collecting their output is bounded by the same deadline.
pub async fn run_with_timeout(
    spec: &CommandSpec,
    args: &[&std::ffi::OsStr],
    working_dir: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let deadline = Instant::now() + timeout;
    let tool = spec.tool_name();
    let mut command = spec.command();
    command.args(args);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);
    tracing::debug!(program = ?spec.program, ?args, ?timeout, "Running external tool");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| match source.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => ProcessError::Missing {
                tool: tool.clone(),
                source,
            },
            _ => ProcessError::Spawn {
                tool: tool.clone(),
                source,
            },
        })?;
    let mut group = ProcessGroup::of(&child);

    let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
    let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(ProcessError::Wait { tool, source });
        }
        Err(_) => {
            group.kill(&tool);
            if let Err(e) = child.kill().await {
                tracing::warn!(%tool, "Failed to kill timed out process: {e}");
            }
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!(%tool, ?timeout, "External tool timed out and was killed");
            return Err(ProcessError::Timeout { tool, timeout });
        }
    };

    // Leftover helpers would otherwise hold the output pipes open
    group.kill(&tool);

    let drained = tokio::time::timeout_at(deadline, async {
        let stdout = join_output(&mut stdout_task, &tool).await;
        let stderr = join_output(&mut stderr_task, &tool).await;
        (stdout, stderr)
    })
    .await;
    let Ok((stdout, stderr)) = drained else {
        stdout_task.abort();
        stderr_task.abort();
        tracing::warn!(%tool, ?timeout, "Output of external tool still open at the deadline");
        return Err(ProcessError::Timeout { tool, timeout });
    };

    Ok(ProcessOutput {
        status,
        stdout,
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

/// Process group led by a spawned tool. Killed at most once, and on drop if
/// nobody killed it earlier.
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { leader: child.id() }
    }

    #[cfg(unix)]
    fn kill(&mut self, tool: &str) {
        let Some(pgid) = self.leader.take().and_then(|id| libc::pid_t::try_from(id).ok()) else {
            return;
        };
        // SAFETY: killpg only sends a signal and touches no memory.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let e = std::io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(%tool, "Failed to kill process group: {e}");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self, _tool: &str) {
        self.leader = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill("external tool");
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn join_output(
    handle: &mut tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    tool: &str,
) -> Vec<u8> {
    match handle.await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::warn!(%tool, "Failed reading process output: {e}");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(%tool, "Failed awaiting process output: {e}");
            Vec::new()
        }
    }
}
