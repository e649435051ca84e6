//! Lifecycle of the vector-store container the knowledge application talks to.
//!
//! States only move `Absent -> Stopped -> Running` and back down; `start` on a
//! stopped container resumes it with `docker start` instead of recreating it,
//! so the data volume and container identity survive restarts.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use log::{debug, info};
use memoria_core::{ContainerConfig, Error, Result};

use crate::process::{run_with_timeout, CommandOutput};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl ContainerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub data_volume: PathBuf,
    pub data_mount: String,
}

impl ContainerSpec {
    /// `default_volume` is used when the configuration does not pin one.
    pub fn from_config(config: &ContainerConfig, default_volume: &Path) -> Self {
        Self {
            name: config.name.clone(),
            image: config.image.clone(),
            host_port: config.host_port,
            container_port: config.container_port,
            data_volume: config
                .data_volume
                .clone()
                .unwrap_or_else(|| default_volume.to_path_buf()),
            data_mount: config.data_mount.clone(),
        }
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-p".to_string(),
            format!("127.0.0.1:{}:{}", self.host_port, self.container_port),
            "-v".to_string(),
            format!("{}:{}", self.data_volume.display(), self.data_mount),
            self.image.clone(),
        ]
    }
}

pub trait ContainerRuntime {
    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// The `docker` command line client.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerCli;

impl ContainerRuntime for DockerCli {
    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let mut command = Command::new("docker");
        command.args(args);
        run_with_timeout(&mut command, timeout)
    }
}

pub struct ContainerLifecycle<R: ContainerRuntime> {
    runtime: R,
    spec: ContainerSpec,
    command_timeout: Duration,
    probe_interval: Duration,
}

impl<R: ContainerRuntime> ContainerLifecycle<R> {
    pub fn new(runtime: R, spec: ContainerSpec, command_timeout: Duration) -> Self {
        Self {
            runtime,
            spec,
            command_timeout,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn state(&self) -> Result<ContainerState> {
        let output = self.runtime.run(
            &[
                "container".to_string(),
                "inspect".to_string(),
                "--format".to_string(),
                "{{.State.Status}}".to_string(),
                self.spec.name.clone(),
            ],
            self.command_timeout,
        )?;
        if !output.success() {
            if output.stderr_text().contains("No such") {
                return Ok(ContainerState::Absent);
            }
            return Err(self.failure("inspect", &output));
        }
        let state = match output.stdout_text().as_str() {
            "running" | "restarting" => ContainerState::Running,
            _ => ContainerState::Stopped,
        };
        debug!("container {} is {}", self.spec.name, state.as_str());
        Ok(state)
    }

    pub fn start(&self) -> Result<()> {
        match self.state()? {
            ContainerState::Running => Ok(()),
            ContainerState::Stopped => {
                info!("resuming container {}", self.spec.name);
                self.docker("start", vec!["start".to_string(), self.spec.name.clone()])
            }
            ContainerState::Absent => {
                info!(
                    "creating container {} from {}",
                    self.spec.name, self.spec.image
                );
                self.docker("run", self.spec.run_args())
            }
        }
    }

    pub fn stop(&self) -> Result<()> {
        if self.state()? != ContainerState::Running {
            return Ok(());
        }
        info!("stopping container {}", self.spec.name);
        self.docker("stop", vec!["stop".to_string(), self.spec.name.clone()])
    }

    pub fn remove(&self) -> Result<()> {
        match self.state()? {
            ContainerState::Absent => Ok(()),
            state => {
                if state == ContainerState::Running {
                    self.docker("stop", vec!["stop".to_string(), self.spec.name.clone()])?;
                }
                info!("removing container {}", self.spec.name);
                self.docker("rm", vec!["rm".to_string(), self.spec.name.clone()])
            }
        }
    }

    /// Polls the published port until it accepts a connection or `timeout`
    /// passes.
    pub fn wait_healthy(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.probe_once(remaining.min(self.probe_interval)) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(
                    "port {} not ready after {}s",
                    self.spec.host_port,
                    timeout.as_secs()
                );
                return false;
            }
            thread::sleep(remaining.min(self.probe_interval));
        }
    }

    pub fn probe_once(&self, connect_timeout: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.spec.host_port));
        let connect_timeout = connect_timeout.max(Duration::from_millis(1));
        TcpStream::connect_timeout(&addr, connect_timeout).is_ok()
    }

    fn docker(&self, action: &str, args: Vec<String>) -> Result<()> {
        let output = self.runtime.run(&args, self.command_timeout)?;
        if !output.success() {
            return Err(self.failure(action, &output));
        }
        Ok(())
    }

    fn failure(&self, action: &str, output: &CommandOutput) -> Error {
        Error::Process {
            command: format!("docker {action} {}", self.spec.name),
            source: anyhow!("exited with status {}: {}", output.status_code, output.stderr_text()),
        }
    }
}
