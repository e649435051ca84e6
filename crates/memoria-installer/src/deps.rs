use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::{debug, info};
use memoria_core::{DependencyConfig, Result, StepPaths};

use crate::process::run_checked;

/// Rebuilds the dependency environment for a payload by running the
/// configured steps in order.
#[derive(Debug, Clone)]
pub struct DependencyInstaller {
    config: DependencyConfig,
    root: PathBuf,
    timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(config: DependencyConfig, root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            config,
            root: root.into(),
            timeout,
        }
    }

    pub fn install(&self, payload: &Path, env: &Path) -> Result<()> {
        let paths = StepPaths {
            root: &self.root,
            payload,
            env,
        };
        for (index, step) in self.config.steps.iter().enumerate() {
            let (program, args) = step.resolve(paths);
            debug!(
                "dependency step {}/{}: {program} {}",
                index + 1,
                self.config.steps.len(),
                args.join(" ")
            );
            let mut command = Command::new(&program);
            command.args(&args).current_dir(payload);
            run_checked(&mut command, self.timeout)?;
        }
        info!("dependency environment ready at {}", env.display());
        Ok(())
    }
}
