//! Child process supervision with a wall-clock deadline.
//!
//! Every child is started as the leader of a fresh process group so that a
//! timeout can take down anything it forked as well.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Everything a finished child left behind
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Stdout went past the output limit and the excess was discarded
    pub stdout_truncated: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum ProcessError {
    /// The program could not be started
    Spawn(io::Error),
    /// Reading from or waiting on the child failed; the child has been killed
    Io(io::Error),
    /// The deadline expired; the process group has been killed and reaped
    TimedOut(Duration),
}

/// Runs `command` to completion or until `deadline` expires
///
/// `stdin` is written concurrently with draining stdout and stderr, so large
/// inputs and outputs cannot deadlock. At most `output_limit` bytes of each
/// stream are kept; the rest is read and discarded. A non-zero exit status is
/// not an error.
///
/// Once the child exits, whatever is left of its process group is killed, so
/// background processes never outlive the call.
pub async fn run_with_deadline(
    mut command: Command,
    stdin: Option<&[u8]>,
    deadline: Duration,
    output_limit: usize,
) -> Result<ProcessOutput, ProcessError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    own_process_group(&mut command);

    let start = Instant::now();
    let mut child = command.spawn().map_err(ProcessError::Spawn)?;
    let pid = child.id();

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let exchange = async {
        let feed = async {
            if let (Some(mut pipe), Some(data)) = (stdin_pipe, stdin) {
                // The child may exit without reading its input
                if let Err(e) = pipe.write_all(data).await {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        log::debug!("Writing stdin to child {pid:?} failed: {e}");
                    }
                }
            }
        };

        let ((), stdout, stderr, status) = tokio::join!(
            feed,
            read_capped(stdout_pipe, output_limit),
            read_capped(stderr_pipe, output_limit),
            child.wait(),
        );
        Ok::<_, io::Error>((status?, stdout?, stderr?))
    };
    let outcome = timeout(deadline, exchange).await;

    match outcome {
        Ok(Ok((status, (stdout, stdout_truncated), (stderr, _)))) => {
            let elapsed = start.elapsed();
            // The leader is reaped, but the group id stays reserved while any
            // member is alive
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
                stdout_truncated,
                elapsed,
            })
        }
        Ok(Err(e)) => {
            terminate(&mut child, pid).await;
            Err(ProcessError::Io(e))
        }
        Err(_) => {
            log::debug!("Child {pid:?} exceeded {deadline:?}, killing its process group");
            terminate(&mut child, pid).await;
            Err(ProcessError::TimedOut(start.elapsed()))
        }
    }
}

/// Keeps the first `limit` bytes and reports whether anything was dropped
async fn read_capped<R>(reader: Option<R>, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, discarded > 0))
}

/// Kills the whole group while the leader is still unreaped, then reaps it
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        log::debug!("Reaping child {pid:?} failed: {e}");
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The group id equals the leader's pid, which is still held by the
    // unreaped leader
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: the group is already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::debug!("Killing process group {pid} failed: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
