use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use memoria_core::{CommandStep, InstallConfig, StepPaths};

use crate::container::{ContainerLifecycle, ContainerRuntime, ContainerSpec, DockerCli};
use crate::deps::DependencyInstaller;
use crate::fs_utils::sibling_path;
use crate::process::run_checked;
use crate::InstallLayout;

/// Side effects an update needs from the outside world.
pub trait ApplyHooks {
    /// Extracts `archive` into the empty directory `dest`.
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()>;

    fn install_dependencies(&self, payload: &Path, env: &Path) -> Result<()>;

    /// Fails unless the freshly applied installation is serving.
    fn probe_health(&self) -> Result<()>;
}

/// Production hooks: `tar`, the configured dependency steps, and the
/// container readiness probe followed by the optional health command.
pub struct SystemGate<R: ContainerRuntime = DockerCli> {
    root: PathBuf,
    payload: PathBuf,
    env: PathBuf,
    process_timeout: Duration,
    health_timeout: Duration,
    dependencies: DependencyInstaller,
    container: ContainerLifecycle<R>,
    health_command: Option<CommandStep>,
}

impl SystemGate<DockerCli> {
    pub fn from_config(config: &InstallConfig, layout: &InstallLayout) -> Self {
        Self::with_runtime(config, layout, DockerCli)
    }
}

impl<R: ContainerRuntime> SystemGate<R> {
    pub fn with_runtime(config: &InstallConfig, layout: &InstallLayout, runtime: R) -> Self {
        let spec = ContainerSpec::from_config(&config.container, &layout.data_dir());
        Self {
            root: layout.root().to_path_buf(),
            payload: layout.payload_dir(),
            env: layout.dependency_env_dir(),
            process_timeout: config.timeouts.process(),
            health_timeout: config.timeouts.health(),
            dependencies: DependencyInstaller::new(
                config.dependencies.clone(),
                layout.root(),
                config.timeouts.process(),
            ),
            container: ContainerLifecycle::new(runtime, spec, config.timeouts.network()),
            health_command: config.health.command.clone(),
        }
    }

    pub fn container(&self) -> &ContainerLifecycle<R> {
        &self.container
    }
}

impl<R: ContainerRuntime> ApplyHooks for SystemGate<R> {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
        let mut command = Command::new("tar");
        command.arg("-xzf").arg(archive).arg("-C").arg(dest);
        run_checked(&mut command, self.process_timeout)?;
        hoist_single_root(dest)
    }

    fn install_dependencies(&self, payload: &Path, env: &Path) -> Result<()> {
        self.dependencies.install(payload, env)?;
        Ok(())
    }

    fn probe_health(&self) -> Result<()> {
        self.container.start()?;
        if !self.container.wait_healthy(self.health_timeout) {
            return Err(anyhow!(
                "container {} did not accept connections on port {} within {}s",
                self.container.spec().name,
                self.container.spec().host_port,
                self.health_timeout.as_secs()
            ));
        }
        if let Some(step) = &self.health_command {
            let (program, args) = step.resolve(StepPaths {
                root: &self.root,
                payload: &self.payload,
                env: &self.env,
            });
            let mut command = Command::new(&program);
            command.args(&args).current_dir(&self.payload);
            run_checked(&mut command, self.health_timeout)?;
        }
        Ok(())
    }
}

/// Release tarballs usually wrap everything in one `memoria-x.y.z/` folder;
/// lift its contents up so `dest` is the payload root.
pub(crate) fn hoist_single_root(dest: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dest)
        .with_context(|| format!("failed to read {}", dest.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to read {}", dest.display()))?;
    if entries.len() != 1 {
        return Ok(());
    }
    let only = entries.remove(0).path();
    if !fs::symlink_metadata(&only)
        .with_context(|| format!("failed to stat {}", only.display()))?
        .is_dir()
    {
        return Ok(());
    }

    debug!("hoisting {} into {}", only.display(), dest.display());
    let hoisted = sibling_path(dest, "hoist");
    fs::rename(&only, &hoisted)
        .with_context(|| format!("failed to move {}", only.display()))?;
    fs::remove_dir(dest).with_context(|| format!("failed to remove {}", dest.display()))?;
    fs::rename(&hoisted, dest)
        .with_context(|| format!("failed to move {} into {}", hoisted.display(), dest.display()))?;
    Ok(())
}
