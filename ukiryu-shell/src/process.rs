//! Spawning a [`SpawnPlan`] with piped streams, optional stdin and a deadline.
//!
//! On Unix the child starts a new session so a timeout can kill the whole
//! process group, including grandchildren that inherited the pipes.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::adapter::{ExecRequest, ProcessOutput, SpawnPlan};
use crate::error::ExecError;
#[cfg(unix)]
use crate::process_group;

/// Runs processes described by a [`SpawnPlan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn, feed stdin, drain stdout/stderr and wait for exit.
    ///
    /// A single deadline covers waiting and draining. When it expires the
    /// process group is killed and reaped before [`ExecError::Timeout`] is
    /// returned.
    pub async fn run(plan: &SpawnPlan, request: &ExecRequest) -> Result<ProcessOutput, ExecError> {
        let executable = request.executable.clone();
        if plan.program.is_empty() {
            return Err(ExecError::Spawn {
                executable,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty program"),
            });
        }

        let started = Instant::now();
        let mut child = build_command(plan, request)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                executable: executable.clone(),
                source,
            })?;
        let pid = child.id();
        tracing::trace!(pid = ?pid, program = %plan.program, "spawned child");

        let stdin_task = spawn_stdin_writer(child.stdin.take(), request.stdin.clone(), &executable);
        let mut stdout_task = spawn_reader(child.stdout.take());
        let mut stderr_task = spawn_reader(child.stderr.take());
        let abort_handles = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        let deadline = request
            .timeout
            .map(|limit| tokio::time::Instant::now() + limit);
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let mut status: Option<ExitStatus> = None;
        let mut stdout: Option<Vec<u8>> = None;
        let mut stderr: Option<Vec<u8>> = None;

        let finished = {
            let mut wait = Box::pin(child.wait());
            loop {
                tokio::select! {
                    result = &mut wait, if status.is_none() => {
                        status = Some(result.map_err(|source| ExecError::Io {
                            executable: executable.clone(),
                            source,
                        })?);
                    }
                    result = &mut stdout_task, if stdout.is_none() => {
                        stdout = Some(join_output(result, &executable)?);
                    }
                    result = &mut stderr_task, if stderr.is_none() => {
                        stderr = Some(join_output(result, &executable)?);
                    }
                    () = &mut timer => break None,
                }

                if let (Some(exit), Some(_), Some(_)) = (status, &stdout, &stderr) {
                    break Some(exit);
                }
            }
        };

        if let Some(task) = &stdin_task {
            task.abort();
        }

        let Some(exit) = finished else {
            let timeout = request.timeout.unwrap_or_default();
            tracing::warn!(%executable, ?timeout, "command timed out, killing process group");
            terminate(&mut child, pid, &executable).await;
            for handle in abort_handles {
                handle.abort();
            }
            return Err(ExecError::Timeout {
                executable,
                timeout,
            });
        };

        let output = ProcessOutput {
            status: normalize_exit_status(exit),
            stdout: stdout.unwrap_or_default(),
            stderr: stderr.unwrap_or_default(),
            duration: started.elapsed(),
        };
        tracing::debug!(
            %executable,
            status = output.status,
            duration_ms = output.duration.as_millis() as u64,
            "command finished"
        );
        Ok(output)
    }
}

/// Exit code when the process reported one, `128 + signal` when a Unix
/// signal ended it, and `-1` otherwise.
pub fn normalize_exit_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[allow(unsafe_code)]
fn build_command(plan: &SpawnPlan, request: &ExecRequest) -> Command {
    let mut command = Command::new(&plan.program);

    #[cfg(windows)]
    if plan.raw_args {
        for arg in &plan.args {
            command.raw_arg(arg);
        }
    } else {
        command.args(&plan.args);
    }
    #[cfg(not(windows))]
    command.args(&plan.args);

    command.envs(&request.env);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }

    command.stdin(if request.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    #[cfg(unix)]
    {
        let parent_pid = std::process::id() as libc::pid_t;
        // SAFETY: the hook only makes async-signal-safe libc calls.
        unsafe {
            command.pre_exec(move || process_group::lead_new_group(parent_pid));
        }
    }

    command
}

/// Write `data` and close the pipe. A child that exits or closes stdin
/// before reading everything is normal, so failures are only logged.
fn spawn_stdin_writer(
    pipe: Option<ChildStdin>,
    data: Option<Vec<u8>>,
    executable: &str,
) -> Option<JoinHandle<()>> {
    let mut pipe = pipe?;
    let data = data?;
    let executable = executable.to_string();
    Some(tokio::spawn(async move {
        let result: io::Result<()> = async {
            pipe.write_all(&data).await?;
            pipe.shutdown().await
        }
        .await;
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(%executable, "child closed stdin before reading all input");
            }
            Err(err) => {
                tracing::warn!(%executable, error = %err, "failed to write stdin");
            }
        }
    }))
}

fn spawn_reader<R>(reader: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut reader) = reader {
            reader.read_to_end(&mut buffer).await?;
        }
        Ok(buffer)
    })
}

fn join_output(
    result: Result<io::Result<Vec<u8>>, tokio::task::JoinError>,
    executable: &str,
) -> Result<Vec<u8>, ExecError> {
    result
        .map_err(io::Error::other)
        .and_then(|inner| inner)
        .map_err(|source| ExecError::Io {
            executable: executable.to_string(),
            source,
        })
}

async fn terminate(child: &mut Child, pid: Option<u32>, executable: &str) {
    #[cfg(unix)]
    if let Some(pid) = pid
        && let Err(err) = process_group::kill_group(pid, executable)
    {
        tracing::debug!(pid, error = %err, "failed to kill process group");
    }
    #[cfg(not(unix))]
    let _ = (pid, executable);

    if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "child already gone");
    }
    if let Err(err) = child.wait().await {
        tracing::debug!(error = %err, "failed to reap killed child");
    }
}
