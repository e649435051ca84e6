use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use log::{debug, warn};
use memoria_core::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs `command` to completion, killing it once `timeout` has elapsed.
///
/// A program that cannot be found is reported as a missing prerequisite
/// rather than a process failure.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let label = describe(command);
    debug!("running `{label}` (timeout {}s)", timeout.as_secs());

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::MissingPrerequisite {
                tool: command.get_program().to_string_lossy().into_owned(),
            });
        }
        Err(err) => {
            return Err(Error::Process {
                command: label,
                source: anyhow::Error::new(err).context("failed to spawn"),
            });
        }
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill(&mut child, &label);
                return Err(Error::Timeout {
                    command: label,
                    timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                kill(&mut child, &label);
                return Err(Error::Process {
                    command: label,
                    source: anyhow::Error::new(err).context("failed to poll child"),
                });
            }
        }
    };

    let status_code = status
        .code()
        .unwrap_or(if status.success() { 0 } else { 1 });
    Ok(CommandOutput {
        status_code,
        stdout: join(stdout),
        stderr: join(stderr),
    })
}

/// Like [`run_with_timeout`], but a non-zero exit is an error carrying stderr.
pub fn run_checked(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let output = run_with_timeout(command, timeout)?;
    if !output.success() {
        return Err(Error::Process {
            command: describe(command),
            source: anyhow!("exited with status {}: {}", output.status_code, output.stderr_text()),
        });
    }
    Ok(output)
}

pub(crate) fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child, label: &str) {
    if let Err(err) = child.kill() {
        warn!("failed to kill `{label}`: {err}");
    }
    let _ = child.wait();
}
