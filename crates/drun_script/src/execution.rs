//! Spawning a shell under a timeout and streaming its merged output.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::process::Child;

use crate::shell::ShellConfig;
use crate::sink::OutputSink;

/// Everything needed to execute one rendered script.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    /// The resolved shell to invoke.
    pub shell: &'a ShellConfig,
    /// Rendered script text, passed as the final argument.
    pub script: &'a str,
    /// Environment overlaid on (or replacing) the parent environment.
    pub env: &'a IndexMap<String, String>,
    /// Whether the child inherits the parent process environment.
    pub inherit_env: bool,
    /// Child working directory.
    pub cwd: &'a Path,
    /// Deadline after which the process group is killed.
    pub timeout: Duration,
}

/// Runtime failure of a child process.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start `{command}`: {source}")]
    Start {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("process exited with status {code}")]
    Exit { code: i32 },

    #[error("process timed out after {}", humanize(.timeout))]
    Timeout { timeout: Duration },

    #[error("i/o error while streaming output: {0}")]
    Io(#[from] io::Error),
}

fn humanize(timeout: &Duration) -> String {
    if timeout.as_secs() == 0 {
        format!("{}ms", timeout.as_millis())
    } else {
        format!("{}s", timeout.as_secs())
    }
}

/// Run a script in the given shell, streaming stdout and stderr line by
/// line into the sink. Returns after the child exits or the timeout kills
/// it.
pub async fn run_script(req: ExecRequest<'_>, sink: &dyn OutputSink) -> Result<(), ExecError> {
    let mut command = tokio::process::Command::new(&req.shell.command);
    command
        .args(&req.shell.args)
        .arg(req.script)
        .current_dir(req.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if !req.inherit_env {
        command.env_clear();
    }
    command.envs(req.env.iter());

    // Children go into their own process group so the timeout kill reaches
    // the whole subtree, not just the shell.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| ExecError::Start {
        command: req.shell.command.clone(),
        source,
    })?;
    let pid = child.id();

    match tokio::time::timeout(req.timeout, stream_and_wait(&mut child, sink)).await {
        Ok(status) => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(ExecError::Exit {
                    code: status.code().unwrap_or(-1),
                })
            }
        }
        Err(_) => {
            kill_process_group(&mut child, pid).await;
            Err(ExecError::Timeout {
                timeout: req.timeout,
            })
        }
    }
}

/// Forward both output streams to the sink in arrival order, then reap the
/// child. Interleaving between the two streams is line-granular.
async fn stream_and_wait(
    child: &mut Child,
    sink: &dyn OutputSink,
) -> Result<std::process::ExitStatus, ExecError> {
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let mut stdout_lines = tokio::io::BufReader::new(stdout).lines();
    let mut stderr_lines = tokio::io::BufReader::new(stderr).lines();
    let mut closed = (false, false);

    while closed != (true, true) {
        let (line, is_stderr) = tokio::select! {
            line = stdout_lines.next_line(), if !closed.0 => (line, false),
            line = stderr_lines.next_line(), if !closed.1 => (line, true),
        };

        match line {
            Ok(Some(line)) => sink.line(&line),
            Ok(None) if is_stderr => closed.1 = true,
            Ok(None) => closed.0 = true,
            Err(e) => {
                tracing::warn!("error reading child output: {e}");
                break;
            }
        }
    }

    Ok(child.wait().await?)
}

async fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // Negative pid targets the whole group created at spawn.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill timed-out child: {e}");
    }
}
